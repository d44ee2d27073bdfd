//! P-arrival timing checks against theoretical expectations.

use crate::records::{CandidateStation, Component, WaveformBundle};
use crate::telemetry::LogManager;
use serde::Serialize;

/// Crustal-average P velocity for the plausibility check.
pub const VALIDATION_P_VELOCITY_KM_S: f64 = 7.5;
pub const MIN_PICK_CONFIDENCE: f64 = 0.7;
pub const MAX_TIMING_CORRECTION_S: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArrivalPick {
    /// Seconds after origin, on the same axis as the trace.
    pub time_s: f64,
    /// 0..=1
    pub confidence: f64,
}

/// Detects the P onset near a theoretical arrival.
pub trait ArrivalPicker {
    fn detect_p_arrival(
        &self,
        samples: &[f64],
        time_axis: &[f64],
        theoretical_p_s: f64,
    ) -> Option<ArrivalPick>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingCorrection {
    pub bundle: WaveformBundle,
    /// Picked minus theoretical P, when it was applied.
    pub correction_s: Option<f64>,
}

/// Shifts every time axis so the picked P lands on the theoretical P.
///
/// The vertical component is picked, falling back to north then east. The
/// shift is applied only for confident picks (> 0.7) under 10 s; otherwise
/// the returned bundle is an unchanged copy.
pub fn correct_timing(
    bundle: &WaveformBundle,
    theoretical_p_s: f64,
    picker: &dyn ArrivalPicker,
) -> TimingCorrection {
    let unchanged = || TimingCorrection {
        bundle: bundle.clone(),
        correction_s: None,
    };
    if !theoretical_p_s.is_finite() || theoretical_p_s <= 0.0 {
        return unchanged();
    }
    let trace = [Component::Vertical, Component::North, Component::East]
        .into_iter()
        .find_map(|c| bundle.component(c));
    let Some(trace) = trace else {
        return unchanged();
    };
    let Some(pick) =
        picker.detect_p_arrival(trace.working_samples(), trace.time_axis(), theoretical_p_s)
    else {
        return unchanged();
    };
    let correction = pick.time_s - theoretical_p_s;
    if pick.confidence <= MIN_PICK_CONFIDENCE || correction.abs() >= MAX_TIMING_CORRECTION_S {
        return unchanged();
    }
    LogManager::new("timing").record(&format!(
        "{}.{} timing corrected by {:.1} s",
        bundle.network(),
        bundle.station(),
        correction
    ));
    TimingCorrection {
        bundle: bundle.with_time_shift(-correction),
        correction_s: Some(correction),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingValidation {
    pub is_valid: bool,
    pub expected_p_s: f64,
    pub observed_p_s: f64,
    pub difference_s: f64,
    pub threshold_s: f64,
    pub distance_km: f64,
}

/// Compares a station's P arrival with a constant 7.5 km/s estimate. Valid
/// when the gap is below `max(10% of expected, 5 s)`.
pub fn validate_timing(station: &CandidateStation) -> TimingValidation {
    validate_p_arrival(station.arrivals().p_s, station.distance_km())
}

pub fn validate_p_arrival(observed_p_s: f64, distance_km: f64) -> TimingValidation {
    let expected_p_s = distance_km / VALIDATION_P_VELOCITY_KM_S;
    let difference_s = (observed_p_s - expected_p_s).abs();
    let threshold_s = (expected_p_s * 0.1).max(5.0);
    let is_valid = difference_s < threshold_s;
    if !is_valid {
        LogManager::new("timing").degraded(&format!(
            "P at {:.1} s differs from {:.1} s expected by {:.1} s",
            observed_p_s, expected_p_s, difference_s
        ));
    }
    TimingValidation {
        is_valid,
        expected_p_s,
        observed_p_s,
        difference_s,
        threshold_s,
        distance_km,
    }
}
