use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};

/// Helper that wraps the `rustfft` planner for one transform length.
pub struct FftHelper {
    fft: std::sync::Arc<dyn Fft<f64>>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self { fft, size }
    }

    /// Forward transform of a real sequence, zero-padded or truncated to the planned size.
    pub fn forward(&self, input: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input
            .iter()
            .take(self.size)
            .map(|&value| Complex64::new(value, 0.0))
            .collect();
        buffer.resize(self.size, Complex64::zero());
        self.fft.process(&mut buffer);
        buffer
    }

    /// One-sided amplitude spectrum for bins `1..=n/2` as `(frequency_hz, |X|·2/n)`.
    pub fn positive_amplitudes(&self, input: &[f64], sampling_rate: f64) -> Vec<(f64, f64)> {
        let n = self.size;
        if n < 2 {
            return Vec::new();
        }
        let spectrum = self.forward(input);
        let scale = 2.0 / n as f64;
        (1..=n / 2)
            .map(|k| {
                let frequency = k as f64 * sampling_rate / n as f64;
                (frequency, spectrum[k].norm() * scale)
            })
            .collect()
    }
}
