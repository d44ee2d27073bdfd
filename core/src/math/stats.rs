pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Population standard deviation (divides by `n`).
    pub fn std_dev(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mean = Self::mean(samples);
        let var = samples.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>()
            / samples.len() as f64;
        var.sqrt()
    }

    /// Median of the values; the mean of the two middle values for even lengths.
    pub fn median(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    /// Median absolute deviation around `center`.
    pub fn mad(samples: &[f64], center: f64) -> f64 {
        let deviations: Vec<f64> = samples.iter().map(|&v| (v - center).abs()).collect();
        Self::median(&deviations)
    }

    pub fn peak_abs(samples: &[f64]) -> f64 {
        samples.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()))
    }
}
