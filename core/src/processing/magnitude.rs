//! Surface-wave magnitude (Ms, IASPEI 20 s formula).

use crate::geodesy::km_to_degrees;
use crate::prelude::{ProcessingError, ProcessingResult};
use crate::processing::filter::{apply_band_filter, DEFAULT_FILTER_ORDER};
use crate::records::{CandidateStation, Component, ComponentTrace, WaveformBundle};
use crate::telemetry::LogManager;
use serde::Serialize;
use std::fmt;

pub const MS_PERIOD_S: f64 = 20.0;
pub const MS_MIN_DISTANCE_KM: f64 = 200.0;
pub const MS_MAX_DISTANCE_KM: f64 = 16_000.0;
pub const MS_LOW_CORNER_HZ: f64 = 0.02;
pub const MS_HIGH_CORNER_HZ: f64 = 0.5;
/// Length of the surface-wave window after the theoretical arrival.
pub const SURFACE_WINDOW_S: f64 = 600.0;
const DEPTH_CORRECTION_ONSET_KM: f64 = 50.0;
const DEPTH_CORRECTION_PER_KM: f64 = -0.0035;
const MM_TO_UM: f64 = 1000.0;
/// Relative difference below which two component rates count as equal.
const RATE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DominantComponent {
    Vertical,
    Horizontal,
}

/// Peak amplitudes in micrometres after band-limiting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentAmplitudes {
    pub north_um: f64,
    pub east_um: f64,
    pub vertical_um: f64,
    /// Peak of the horizontal vector `sqrt(n² + e²)`.
    pub horizontal_um: f64,
}

/// Every intermediate quantity of one Ms computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MagnitudeExplanation {
    pub amplitudes: ComponentAmplitudes,
    pub dominant: DominantComponent,
    pub amplitude_um: f64,
    pub period_s: f64,
    pub distance_km: f64,
    pub distance_deg: f64,
    pub band_hz: (f64, f64),
    /// `log10(A / T)`
    pub amplitude_term: f64,
    /// `1.66 · log10(Δ)`
    pub distance_term: f64,
    pub depth_km: Option<f64>,
    pub depth_correction: Option<f64>,
    pub unrounded: f64,
    pub magnitude: f64,
}

impl fmt::Display for MagnitudeExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.amplitudes;
        writeln!(f, "Ms magnitude: {:.1}", self.magnitude)?;
        writeln!(f, "Component used: {:?}", self.dominant)?;
        writeln!(f, "Amplitudes:")?;
        writeln!(f, "  north       {:.1} um", a.north_um)?;
        writeln!(f, "  east        {:.1} um", a.east_um)?;
        writeln!(f, "  vertical    {:.1} um", a.vertical_um)?;
        writeln!(f, "  horizontal  {:.1} um (vector peak)", a.horizontal_um)?;
        writeln!(f, "Parameters:")?;
        writeln!(f, "  period T    {:.1} s", self.period_s)?;
        writeln!(
            f,
            "  distance    {:.0} km ({:.1} deg)",
            self.distance_km, self.distance_deg
        )?;
        writeln!(
            f,
            "  band        {}-{:.3} Hz",
            self.band_hz.0, self.band_hz.1
        )?;
        writeln!(f, "Formula: Ms = log10(A/T) + 1.66*log10(D) + 3.3")?;
        writeln!(
            f,
            "  Ms = log10({:.1}/{:.0}) + 1.66*log10({:.1}) + 3.3",
            self.amplitude_um, self.period_s, self.distance_deg
        )?;
        writeln!(
            f,
            "  Ms = {:.3} + {:.3} + 3.3",
            self.amplitude_term, self.distance_term
        )?;
        if let (Some(correction), Some(depth)) = (self.depth_correction, self.depth_km) {
            writeln!(
                f,
                "Depth correction: {:.3} (depth {:.0} km)",
                correction, depth
            )?;
        }
        write!(f, "  Ms = {:.1}", self.magnitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MagnitudeResult {
    /// Rounded to one decimal.
    pub magnitude: f64,
    pub dominant: DominantComponent,
    pub amplitudes: ComponentAmplitudes,
    pub period_s: f64,
    pub distance_km: f64,
    pub distance_deg: f64,
    pub depth_correction: Option<f64>,
    pub band_hz: (f64, f64),
    pub explanation: MagnitudeExplanation,
}

fn peak_um(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())) * MM_TO_UM
}

/// Ms from three displacement components in millimetres.
///
/// All components are band-limited to 0.02–min(0.5, 0.9·Nyquist) Hz. The
/// amplitude is the larger of the vertical peak and the horizontal vector
/// peak, the period is fixed at 20 s, and sources deeper than 50 km get
/// `-0.0035 · (depth - 50)`.
pub fn calculate_ms_magnitude(
    north: &[f64],
    east: &[f64],
    vertical: &[f64],
    distance_km: f64,
    sampling_rate: f64,
    depth_km: Option<f64>,
) -> ProcessingResult<MagnitudeResult> {
    if !distance_km.is_finite() {
        return Err(ProcessingError::InvalidInput(format!(
            "distance {} km is not finite",
            distance_km
        )));
    }
    if distance_km < MS_MIN_DISTANCE_KM {
        return Err(ProcessingError::DistanceTooShort { distance_km });
    }
    if distance_km > MS_MAX_DISTANCE_KM {
        return Err(ProcessingError::DistanceTooLong { distance_km });
    }
    let nyquist = sampling_rate / 2.0;
    if nyquist.is_nan() || nyquist < 0.5 {
        return Err(ProcessingError::SamplingRateTooLow { sampling_rate });
    }
    for (name, samples) in [("north", north), ("east", east), ("vertical", vertical)] {
        if samples.is_empty() {
            return Err(ProcessingError::InvalidInput(format!(
                "{} component has no samples",
                name
            )));
        }
    }

    let low = MS_LOW_CORNER_HZ;
    let high = MS_HIGH_CORNER_HZ.min(0.9 * nyquist);
    let band = |samples: &[f64]| {
        apply_band_filter(samples, sampling_rate, Some(low), Some(high), DEFAULT_FILTER_ORDER)
            .map(|filtered| filtered.samples)
    };
    let north_f = band(north)?;
    let east_f = band(east)?;
    let vertical_f = band(vertical)?;

    let horizontal_um = north_f
        .iter()
        .zip(&east_f)
        .map(|(n, e)| (n * n + e * e).sqrt())
        .fold(0.0_f64, f64::max)
        * MM_TO_UM;
    let amplitudes = ComponentAmplitudes {
        north_um: peak_um(&north_f),
        east_um: peak_um(&east_f),
        vertical_um: peak_um(&vertical_f),
        horizontal_um,
    };
    let (amplitude_um, dominant) = if amplitudes.vertical_um >= amplitudes.horizontal_um {
        (amplitudes.vertical_um, DominantComponent::Vertical)
    } else {
        (amplitudes.horizontal_um, DominantComponent::Horizontal)
    };
    if amplitude_um.is_nan() || amplitude_um <= 0.0 {
        return Err(ProcessingError::InvalidInput(
            "zero amplitude after filtering".into(),
        ));
    }

    let period_s = MS_PERIOD_S;
    let distance_deg = km_to_degrees(distance_km);
    let amplitude_term = (amplitude_um / period_s).log10();
    let distance_term = 1.66 * distance_deg.log10();
    let depth_correction = depth_km
        .filter(|d| *d > DEPTH_CORRECTION_ONSET_KM)
        .map(|d| DEPTH_CORRECTION_PER_KM * (d - DEPTH_CORRECTION_ONSET_KM));
    let unrounded = amplitude_term + distance_term + 3.3 + depth_correction.unwrap_or(0.0);
    let magnitude = (unrounded * 10.0).round() / 10.0;

    LogManager::new("magnitude").record(&format!(
        "Ms {:.1} from {:.1} um ({:?}) at {:.0} km",
        magnitude, amplitude_um, dominant, distance_km
    ));

    let explanation = MagnitudeExplanation {
        amplitudes,
        dominant,
        amplitude_um,
        period_s,
        distance_km,
        distance_deg,
        band_hz: (low, high),
        amplitude_term,
        distance_term,
        depth_km,
        depth_correction,
        unrounded,
        magnitude,
    };
    Ok(MagnitudeResult {
        magnitude,
        dominant,
        amplitudes,
        period_s,
        distance_km,
        distance_deg,
        depth_correction,
        band_hz: (low, high),
        explanation,
    })
}

/// Working samples whose time falls in `[arrival_s, arrival_s + 600]`.
pub fn surface_wave_window(trace: &ComponentTrace, surface_arrival_s: f64) -> Vec<f64> {
    let end = surface_arrival_s + SURFACE_WINDOW_S;
    trace
        .time_axis()
        .iter()
        .zip(trace.working_samples())
        .filter(|(t, _)| **t >= surface_arrival_s && **t <= end)
        .map(|(_, v)| *v)
        .collect()
}

/// Ms over the surface-wave window of `bundle` for `station`. The three
/// components must share one sampling rate.
pub fn calculate_ms_for_bundle(
    bundle: &WaveformBundle,
    station: &CandidateStation,
    depth_km: Option<f64>,
) -> ProcessingResult<MagnitudeResult> {
    let arrival = station.arrivals().surface_s;
    let window = |component: Component| -> ProcessingResult<(Vec<f64>, f64)> {
        let trace = bundle.component(component).ok_or_else(|| {
            ProcessingError::InvalidInput(format!("missing {:?} component", component))
        })?;
        Ok((surface_wave_window(trace, arrival), trace.sampling_rate()))
    };
    let (north, rate) = window(Component::North)?;
    let (east, east_rate) = window(Component::East)?;
    let (vertical, vertical_rate) = window(Component::Vertical)?;
    let same_rate =
        |other: f64| (other - rate).abs() <= RATE_TOLERANCE * rate.abs().max(other.abs());
    if !same_rate(east_rate) || !same_rate(vertical_rate) {
        return Err(ProcessingError::InvalidInput(format!(
            "component sampling rates differ: N {} Hz, E {} Hz, Z {} Hz",
            rate, east_rate, vertical_rate
        )));
    }
    calculate_ms_magnitude(
        &north,
        &east,
        &vertical,
        station.distance_km(),
        rate,
        depth_km,
    )
}
