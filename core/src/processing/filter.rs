//! Zero-phase Butterworth filtering built from second-order sections.

use crate::prelude::{ProcessingError, ProcessingResult};
use crate::telemetry::LogManager;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_FILTER_ORDER: usize = 4;

/// Corners at or above this fraction of Nyquist are too close to it.
const NYQUIST_GUARD: f64 = 0.95;
/// Band-pass upper corners past the guard are pulled down to this fraction.
const NYQUIST_CLAMP: f64 = 0.9;
const MIN_LOW_CORNER_HZ: f64 = 0.001;
const RAISED_LOW_CORNER_HZ: f64 = 0.005;

/// Named bands for common seismic phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandPreset {
    Broadband,
    PWaves,
    SWaves,
    Surface,
    LongPeriod,
}

impl BandPreset {
    pub const ALL: [BandPreset; 5] = [
        BandPreset::Broadband,
        BandPreset::PWaves,
        BandPreset::SWaves,
        BandPreset::Surface,
        BandPreset::LongPeriod,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BandPreset::Broadband => "broadband",
            BandPreset::PWaves => "p_waves",
            BandPreset::SWaves => "s_waves",
            BandPreset::Surface => "surface",
            BandPreset::LongPeriod => "long_period",
        }
    }

    pub fn band(self) -> FilterBand {
        let corners = |low, high| FilterBand::Corners {
            low: Some(low),
            high: Some(high),
        };
        match self {
            BandPreset::Broadband => FilterBand::Unfiltered,
            BandPreset::PWaves => corners(1.0, 10.0),
            BandPreset::SWaves => corners(0.5, 5.0),
            BandPreset::Surface => corners(0.02, 0.5),
            BandPreset::LongPeriod => corners(0.005, 0.1),
        }
    }
}

impl fmt::Display for BandPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BandPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BandPreset::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| {
                format!(
                    "unknown band preset '{}' (expected one of: {})",
                    s,
                    BandPreset::ALL.map(|p| p.name()).join(", ")
                )
            })
    }
}

/// Band requested for processing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterBand {
    Unfiltered,
    Corners { low: Option<f64>, high: Option<f64> },
}

impl From<BandPreset> for FilterBand {
    fn from(preset: BandPreset) -> Self {
        preset.band()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

/// What was actually applied, after any corner adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFilter {
    pub kind: FilterKind,
    pub low_hz: Option<f64>,
    pub high_hz: Option<f64>,
    pub order: usize,
    pub sampling_rate: f64,
    pub adjustments: Vec<String>,
    /// Non-finite input samples removed before filtering.
    pub dropped_non_finite: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredTrace {
    pub samples: Vec<f64>,
    pub applied: AppliedFilter,
}

/// Second-order section, Direct Form II transposed, `a0` normalised to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self { b, a }
    }

    pub fn is_stable(&self) -> bool {
        self.a[1].abs() < 1.0 && self.a[0].abs() < 1.0 + self.a[1]
    }

    fn dc_gain(&self) -> f64 {
        let den = 1.0 + self.a[0] + self.a[1];
        if den.abs() < f64::EPSILON {
            0.0
        } else {
            (self.b[0] + self.b[1] + self.b[2]) / den
        }
    }

    /// State that makes a constant unit input produce a constant output.
    fn step_state(&self) -> [f64; 2] {
        let gain = self.dc_gain();
        let s1 = self.b[2] - self.a[1] * gain;
        let s0 = self.b[1] - self.a[0] * gain + s1;
        [s0, s1]
    }

    fn run(&self, samples: &mut [f64], mut state: [f64; 2]) {
        for x in samples.iter_mut() {
            let input = *x;
            let output = self.b[0] * input + state[0];
            state[0] = self.b[1] * input - self.a[0] * output + state[1];
            state[1] = self.b[2] * input - self.a[1] * output;
            *x = output;
        }
    }
}

/// Cascade of biquads.
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<Biquad>,
}

impl SosFilter {
    pub fn butterworth_lowpass(order: usize, cutoff_hz: f64, sampling_rate: f64) -> Self {
        Self {
            sections: butterworth_sections(order, cutoff_hz, sampling_rate, FilterKind::Lowpass),
        }
    }

    pub fn butterworth_highpass(order: usize, cutoff_hz: f64, sampling_rate: f64) -> Self {
        Self {
            sections: butterworth_sections(order, cutoff_hz, sampling_rate, FilterKind::Highpass),
        }
    }

    /// High-pass at `low_hz` cascaded with low-pass at `high_hz`.
    pub fn butterworth_bandpass(
        order: usize,
        low_hz: f64,
        high_hz: f64,
        sampling_rate: f64,
    ) -> Self {
        let mut sections = butterworth_sections(order, low_hz, sampling_rate, FilterKind::Highpass);
        sections.extend(butterworth_sections(
            order,
            high_hz,
            sampling_rate,
            FilterKind::Lowpass,
        ));
        Self { sections }
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    pub fn is_stable(&self) -> bool {
        self.sections.iter().all(Biquad::is_stable)
    }

    /// Causal filtering from steady state at the first sample.
    pub fn filter(&self, samples: &[f64]) -> Vec<f64> {
        let mut out = samples.to_vec();
        self.run_steady(&mut out);
        out
    }

    fn run_steady(&self, samples: &mut [f64]) {
        let Some(&first) = samples.first() else {
            return;
        };
        let mut level = first;
        for section in &self.sections {
            let unit = section.step_state();
            section.run(samples, [unit[0] * level, unit[1] * level]);
            level *= section.dc_gain();
        }
    }

    /// Forward-backward filtering with odd extension at both ends.
    pub fn filtfilt(&self, samples: &[f64]) -> Vec<f64> {
        let n = samples.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = (3 * (2 * self.sections.len() + 1)).min(n - 1);
        let first = samples[0];
        let last = samples[n - 1];

        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - samples[i]));
        extended.extend_from_slice(samples);
        extended.extend((1..=pad).map(|i| 2.0 * last - samples[n - 1 - i]));

        self.run_steady(&mut extended);
        extended.reverse();
        self.run_steady(&mut extended);
        extended.reverse();
        extended[pad..pad + n].to_vec()
    }
}

fn butterworth_sections(
    order: usize,
    cutoff_hz: f64,
    sampling_rate: f64,
    kind: FilterKind,
) -> Vec<Biquad> {
    let k = (PI * cutoff_hz / sampling_rate).tan();
    let k2 = k * k;
    let highpass = kind == FilterKind::Highpass;
    let mut sections = Vec::with_capacity(order.div_ceil(2));

    for pair in 0..order / 2 {
        let theta = PI * (2 * pair + order + 1) as f64 / (2 * order) as f64;
        let q = -1.0 / (2.0 * theta.cos());
        let norm = 1.0 / (1.0 + k / q + k2);
        let a = [2.0 * (k2 - 1.0) * norm, (1.0 - k / q + k2) * norm];
        let b = if highpass {
            [norm, -2.0 * norm, norm]
        } else {
            [k2 * norm, 2.0 * k2 * norm, k2 * norm]
        };
        sections.push(Biquad::new(b, a));
    }

    if order % 2 == 1 {
        let norm = 1.0 / (1.0 + k);
        let a = [(k - 1.0) * norm, 0.0];
        let b = if highpass {
            [norm, -norm, 0.0]
        } else {
            [k * norm, k * norm, 0.0]
        };
        sections.push(Biquad::new(b, a));
    }
    sections
}

/// Resolves the requested corners into a filter kind and final corners.
///
/// A lone high corner gives a high-pass and a lone low corner a low-pass;
/// either fails past 0.95·Nyquist. With both corners the result is always a
/// band-pass: a high corner at or past 0.95·Nyquist, Nyquist itself included,
/// is clamped to 0.9·Nyquist rather than turning the request into a low-pass
/// at the low corner.
fn resolve_band(
    low: Option<f64>,
    high: Option<f64>,
    nyquist: f64,
    adjustments: &mut Vec<String>,
) -> ProcessingResult<(FilterKind, Option<f64>, Option<f64>)> {
    let guard = NYQUIST_GUARD * nyquist;
    let too_high = |frequency_hz: f64| ProcessingError::FrequencyTooHigh {
        frequency_hz,
        nyquist_hz: nyquist,
    };
    let positive = |v: Option<f64>| v.filter(|f| *f > 0.0);

    match (positive(low), high) {
        (None, None) => Err(ProcessingError::InvalidBand { low, high }),
        (None, Some(high_hz)) => {
            if high_hz <= 0.0 || !high_hz.is_finite() {
                return Err(ProcessingError::InvalidBand { low, high });
            }
            if high_hz >= guard {
                return Err(too_high(high_hz));
            }
            Ok((FilterKind::Highpass, None, Some(high_hz)))
        }
        (Some(low_hz), None) => {
            if !low_hz.is_finite() {
                return Err(ProcessingError::InvalidBand { low, high });
            }
            if low_hz >= guard {
                return Err(too_high(low_hz));
            }
            Ok((FilterKind::Lowpass, Some(low_hz), None))
        }
        (Some(mut low_hz), Some(mut high_hz)) => {
            if !low_hz.is_finite() || !high_hz.is_finite() || low_hz >= high_hz {
                return Err(ProcessingError::InvalidBand { low, high });
            }
            if high_hz >= guard {
                let clamped = NYQUIST_CLAMP * nyquist;
                adjustments.push(format!(
                    "high corner {:.3} Hz clamped to {:.3} Hz (Nyquist {:.3} Hz)",
                    high_hz, clamped, nyquist
                ));
                high_hz = clamped;
            }
            if low_hz <= MIN_LOW_CORNER_HZ {
                adjustments.push(format!(
                    "low corner {:.4} Hz raised to {:.3} Hz",
                    low_hz, RAISED_LOW_CORNER_HZ
                ));
                low_hz = RAISED_LOW_CORNER_HZ;
            }
            if high_hz >= guard {
                return Err(too_high(high_hz));
            }
            if low_hz >= high_hz {
                return Err(ProcessingError::InvalidBand {
                    low: Some(low_hz),
                    high: Some(high_hz),
                });
            }
            Ok((FilterKind::Bandpass, Some(low_hz), Some(high_hz)))
        }
    }
}

/// Zero-phase Butterworth filtering of `samples`.
///
/// With only `high` the trace is high-passed at `high`; with only `low` it is
/// low-passed at `low`; with both it is band-passed. A band-pass upper
/// corner too close to Nyquist is clamped to 0.9·Nyquist and a vanishing
/// lower corner is raised to 0.005 Hz, both reported in `adjustments`.
/// Non-finite samples are dropped unless they are the majority.
pub fn apply_band_filter(
    samples: &[f64],
    sampling_rate: f64,
    low: Option<f64>,
    high: Option<f64>,
    order: usize,
) -> ProcessingResult<FilteredTrace> {
    let log = LogManager::new("filter");
    if samples.is_empty() {
        return Err(ProcessingError::InvalidInput("no samples to filter".into()));
    }
    if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
        return Err(ProcessingError::InvalidInput(format!(
            "sampling rate {} Hz must be positive",
            sampling_rate
        )));
    }
    if order == 0 {
        return Err(ProcessingError::InvalidInput("filter order must be at least 1".into()));
    }

    let finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    let dropped = samples.len() - finite.len();
    if finite.len() * 2 < samples.len() {
        return Err(ProcessingError::InvalidInput(format!(
            "{} of {} samples are not finite",
            dropped,
            samples.len()
        )));
    }
    if dropped > 0 {
        log.degraded(&format!("dropped {} non-finite samples", dropped));
    }

    let nyquist = sampling_rate / 2.0;
    let mut adjustments = Vec::new();
    let (kind, low_hz, high_hz) = resolve_band(low, high, nyquist, &mut adjustments)?;
    for note in &adjustments {
        log.degraded(note);
    }

    let sos = match (kind, low_hz, high_hz) {
        (FilterKind::Highpass, _, Some(h)) => SosFilter::butterworth_highpass(order, h, sampling_rate),
        (FilterKind::Lowpass, Some(l), _) => SosFilter::butterworth_lowpass(order, l, sampling_rate),
        (FilterKind::Bandpass, Some(l), Some(h)) => {
            SosFilter::butterworth_bandpass(order, l, h, sampling_rate)
        }
        _ => return Err(ProcessingError::InvalidBand { low, high }),
    };
    if !sos.is_stable() {
        return Err(ProcessingError::FilterUnstable(format!(
            "{:?} design at {:?}-{:?} Hz has poles outside the unit circle",
            kind, low_hz, high_hz
        )));
    }

    let filtered = sos.filtfilt(&finite);
    if let Some(position) = filtered.iter().position(|v| !v.is_finite()) {
        return Err(ProcessingError::FilterUnstable(format!(
            "non-finite output at sample {}",
            position
        )));
    }

    log.detail(&format!(
        "{:?} {:?}-{:?} Hz order {} over {} samples",
        kind,
        low_hz,
        high_hz,
        order,
        filtered.len()
    ));
    Ok(FilteredTrace {
        samples: filtered,
        applied: AppliedFilter {
            kind,
            low_hz,
            high_hz,
            order,
            sampling_rate,
            adjustments,
            dropped_non_finite: dropped,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::StatsHelper;

    fn sine(frequency: f64, sampling_rate: f64, seconds: f64) -> Vec<f64> {
        let n = (sampling_rate * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * PI * frequency * i as f64 / sampling_rate).sin())
            .collect()
    }

    fn middle(samples: &[f64]) -> &[f64] {
        let quarter = samples.len() / 4;
        &samples[quarter..samples.len() - quarter]
    }

    #[test]
    fn explicit_band_with_low_above_high_never_succeeds() {
        let data = sine(1.0, 20.0, 10.0);
        for (low, high) in [(5.0, 1.0), (2.0, 2.0), (9.0, 0.5)] {
            assert!(matches!(
                apply_band_filter(&data, 20.0, Some(low), Some(high), 4),
                Err(ProcessingError::InvalidBand { .. })
            ));
        }
    }

    #[test]
    fn band_near_nyquist_is_clamped() {
        let data = sine(3.0, 20.0, 30.0);
        let result = apply_band_filter(&data, 20.0, Some(1.0), Some(11.0), 4).unwrap();
        assert_eq!(result.applied.kind, FilterKind::Bandpass);
        assert!((result.applied.high_hz.unwrap() - 9.0).abs() < 1e-12);
        assert_eq!(result.applied.adjustments.len(), 1);
        assert_eq!(result.samples.len(), data.len());
    }

    #[test]
    fn high_corner_at_nyquist_keeps_the_band() {
        let data = sine(3.0, 20.0, 30.0);
        for high in [10.0, 10.5, 50.0] {
            let result = apply_band_filter(&data, 20.0, Some(1.0), Some(high), 4).unwrap();
            assert_eq!(result.applied.kind, FilterKind::Bandpass);
            assert_eq!(result.applied.low_hz, Some(1.0));
            assert!((result.applied.high_hz.unwrap() - 9.0).abs() < 1e-12);
        }
    }

    #[test]
    fn single_corner_near_nyquist_is_rejected() {
        let data = sine(1.0, 20.0, 10.0);
        assert!(matches!(
            apply_band_filter(&data, 20.0, None, Some(9.8), 4),
            Err(ProcessingError::FrequencyTooHigh { .. })
        ));
        assert!(matches!(
            apply_band_filter(&data, 20.0, Some(9.9), None, 4),
            Err(ProcessingError::FrequencyTooHigh { .. })
        ));
        assert!(matches!(
            apply_band_filter(&data, 20.0, None, None, 4),
            Err(ProcessingError::InvalidBand { .. })
        ));
    }

    #[test]
    fn tiny_low_corner_is_raised() {
        let data = sine(0.05, 1.0, 2000.0);
        let result = apply_band_filter(&data, 1.0, Some(0.0005), Some(0.2), 2).unwrap();
        assert_eq!(result.applied.low_hz, Some(0.005));
    }

    #[test]
    fn bandpass_keeps_passband_and_rejects_stopband() {
        let rate = 100.0;
        let pass = sine(5.0, rate, 20.0);
        let stop = sine(40.0, rate, 20.0);
        let mixed: Vec<f64> = pass.iter().zip(&stop).map(|(a, b)| a + b).collect();

        let result = apply_band_filter(&mixed, rate, Some(1.0), Some(10.0), 4).unwrap();
        let residual: Vec<f64> = result
            .samples
            .iter()
            .zip(&pass)
            .map(|(y, p)| y - p)
            .collect();
        assert!(StatsHelper::rms(middle(&residual)) < 0.05);
    }

    #[test]
    fn zero_phase_filter_preserves_peak_position() {
        let rate = 50.0;
        let mut pulse = vec![0.0; 1000];
        for (i, value) in pulse.iter_mut().enumerate() {
            let t = (i as f64 - 500.0) / rate;
            *value = (-t * t * 4.0).exp();
        }
        let smoothed = apply_band_filter(&pulse, rate, Some(5.0), None, 4).unwrap();
        let peak = smoothed
            .samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 500);
    }

    #[test]
    fn highpass_removes_offset() {
        let data: Vec<f64> = sine(2.0, 50.0, 20.0).iter().map(|v| v + 10.0).collect();
        let result = apply_band_filter(&data, 50.0, None, Some(0.5), 4).unwrap();
        assert_eq!(result.applied.kind, FilterKind::Highpass);
        assert!(StatsHelper::mean(middle(&result.samples)).abs() < 0.05);
    }

    #[test]
    fn non_finite_samples_are_dropped_or_rejected() {
        let mut data = sine(1.0, 20.0, 10.0);
        data[3] = f64::NAN;
        data[7] = f64::INFINITY;
        let result = apply_band_filter(&data, 20.0, Some(0.5), Some(2.0), 4).unwrap();
        assert_eq!(result.applied.dropped_non_finite, 2);
        assert_eq!(result.samples.len(), data.len() - 2);

        let mostly_bad = vec![f64::NAN, f64::NAN, 1.0];
        assert!(matches!(
            apply_band_filter(&mostly_bad, 20.0, Some(0.5), Some(2.0), 4),
            Err(ProcessingError::InvalidInput(_))
        ));
    }

    #[test]
    fn empty_input_and_bad_rate_are_invalid() {
        assert!(matches!(
            apply_band_filter(&[], 20.0, Some(1.0), Some(2.0), 4),
            Err(ProcessingError::InvalidInput(_))
        ));
        assert!(matches!(
            apply_band_filter(&[1.0, 2.0], 0.0, Some(1.0), Some(2.0), 4),
            Err(ProcessingError::InvalidInput(_))
        ));
    }

    #[test]
    fn odd_orders_design_stable_sections() {
        let sos = SosFilter::butterworth_bandpass(3, 0.02, 0.5, 20.0);
        assert_eq!(sos.sections().len(), 4);
        assert!(sos.is_stable());
    }

    #[test]
    fn steady_state_start_has_no_transient_for_constant_input() {
        let sos = SosFilter::butterworth_lowpass(4, 1.0, 20.0);
        let out = sos.filter(&[3.0; 64]);
        assert!(out.iter().all(|v| (v - 3.0).abs() < 1e-9));
    }

    #[test]
    fn presets_parse_by_name() {
        assert_eq!("surface".parse::<BandPreset>(), Ok(BandPreset::Surface));
        assert_eq!(BandPreset::Broadband.band(), FilterBand::Unfiltered);
        assert!("ultra".parse::<BandPreset>().is_err());
        assert_eq!(
            BandPreset::LongPeriod.band(),
            FilterBand::Corners {
                low: Some(0.005),
                high: Some(0.1)
            }
        );
    }
}
