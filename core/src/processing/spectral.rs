use crate::math::FftHelper;
use crate::processing::magnitude::MS_PERIOD_S;
use serde::Serialize;

pub const DEFAULT_TARGET_BAND_S: (f64, f64) = (15.0, 25.0);
const MIN_PERIOD_S: f64 = 5.0;
const MAX_PERIOD_S: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PeriodQuality {
    /// Within 2 s of 20 s.
    Optimal,
    /// Within 5 s of 20 s.
    Acceptable,
    LowQuality,
}

impl PeriodQuality {
    pub fn for_period(period_s: f64) -> Self {
        let deviation = (period_s - MS_PERIOD_S).abs();
        if deviation < 2.0 {
            PeriodQuality::Optimal
        } else if deviation < 5.0 {
            PeriodQuality::Acceptable
        } else {
            PeriodQuality::LowQuality
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectralPeak {
    pub period_s: f64,
    pub amplitude: f64,
    /// False when the record had no bins in the target band and the global
    /// peak was used instead.
    pub in_target_band: bool,
    pub quality: PeriodQuality,
}

/// Amplitude spectrum as `(period_s, |X|·2/n)` over 5–100 s, sorted by period.
pub fn period_spectrum(samples: &[f64], sampling_rate: f64) -> Vec<(f64, f64)> {
    if samples.len() < 2 || !sampling_rate.is_finite() || sampling_rate <= 0.0 {
        return Vec::new();
    }
    let helper = FftHelper::new(samples.len());
    let mut spectrum: Vec<(f64, f64)> = helper
        .positive_amplitudes(samples, sampling_rate)
        .into_iter()
        .map(|(frequency, amplitude)| (1.0 / frequency, amplitude))
        .filter(|(period, amplitude)| {
            (MIN_PERIOD_S..=MAX_PERIOD_S).contains(period) && amplitude.is_finite()
        })
        .collect();
    spectrum.sort_by(|a, b| a.0.total_cmp(&b.0));
    spectrum
}

fn loudest<'a>(bins: impl Iterator<Item = &'a (f64, f64)>) -> Option<(f64, f64)> {
    bins.copied().fold(None, |best, bin| match best {
        Some((_, amplitude)) if amplitude >= bin.1 => best,
        _ => Some(bin),
    })
}

/// Dominant period of `samples`. The loudest bin inside `target_band_s` wins
/// when the record resolves any period in that band; otherwise the loudest
/// bin in 5–100 s is reported. `None` when no bin falls in 5–100 s.
pub fn spectral_peak_period(
    samples: &[f64],
    sampling_rate: f64,
    target_band_s: (f64, f64),
) -> Option<SpectralPeak> {
    let spectrum = period_spectrum(samples, sampling_rate);
    let (lo, hi) = target_band_s;
    let in_band = loudest(spectrum.iter().filter(|(p, _)| *p >= lo && *p <= hi));
    let (peak, in_target_band) = match in_band {
        Some(peak) => (peak, true),
        None => (loudest(spectrum.iter())?, false),
    };
    Some(SpectralPeak {
        period_s: peak.0,
        amplitude: peak.1,
        in_target_band,
        quality: PeriodQuality::for_period(peak.0),
    })
}
