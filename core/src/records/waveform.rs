use crate::prelude::RecordError;
use crate::records::{CandidateStation, EarthquakeEvent};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Seconds of pre-event data requested before the origin.
pub const PRE_EVENT_S: f64 = 60.0;
/// Seconds of data requested after the surface-wave arrival.
pub const POST_SURFACE_S: f64 = 600.0;
/// Channel families requested for full downloads, in preference order.
pub const DOWNLOAD_CHANNEL_FAMILIES: [&str; 4] = ["BH?", "HH?", "SH?", "EH?"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Component {
    North,
    East,
    Vertical,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::North, Component::East, Component::Vertical];

    pub fn code(self) -> char {
        match self {
            Component::North => 'N',
            Component::East => 'E',
            Component::Vertical => 'Z',
        }
    }

    /// Orientation from the last letter of a SEED channel code (`BHZ`, `HH1`).
    pub fn from_channel_code(channel: &str) -> Option<Self> {
        match channel.chars().last()? {
            'N' | '1' => Some(Component::North),
            'E' | '2' => Some(Component::East),
            'Z' => Some(Component::Vertical),
            _ => None,
        }
    }
}

/// One component's samples with its own rate and time axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentTrace {
    raw: Vec<f64>,
    displacement: Option<Vec<f64>>,
    sampling_rate: f64,
    time_axis: Vec<f64>,
}

impl ComponentTrace {
    pub fn new(
        component: Component,
        raw: Vec<f64>,
        displacement: Option<Vec<f64>>,
        sampling_rate: f64,
        time_axis: Vec<f64>,
    ) -> Result<Self, RecordError> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(RecordError::SamplingRate(sampling_rate));
        }
        let mismatch = |field, actual| RecordError::LengthMismatch {
            component: format!("{:?}", component),
            field,
            expected: raw.len(),
            actual,
        };
        if time_axis.len() != raw.len() {
            return Err(mismatch("time axis", time_axis.len()));
        }
        if let Some(disp) = &displacement {
            if disp.len() != raw.len() {
                return Err(mismatch("displacement", disp.len()));
            }
        }
        Ok(Self {
            raw,
            displacement,
            sampling_rate,
            time_axis,
        })
    }

    /// Evenly sampled trace whose first sample sits at `start_s` after origin.
    pub fn regular(
        component: Component,
        raw: Vec<f64>,
        displacement: Option<Vec<f64>>,
        sampling_rate: f64,
        start_s: f64,
    ) -> Result<Self, RecordError> {
        let time_axis = (0..raw.len())
            .map(|i| start_s + i as f64 / sampling_rate)
            .collect();
        Self::new(component, raw, displacement, sampling_rate, time_axis)
    }

    pub fn raw(&self) -> &[f64] {
        &self.raw
    }

    pub fn displacement(&self) -> Option<&[f64]> {
        self.displacement.as_deref()
    }

    /// Calibrated displacement when present, raw samples otherwise.
    pub fn working_samples(&self) -> &[f64] {
        self.displacement().unwrap_or(&self.raw)
    }

    pub fn is_calibrated(&self) -> bool {
        self.displacement.is_some()
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn time_axis(&self) -> &[f64] {
        &self.time_axis
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Per-station waveforms keyed by component. Never mutated by the engines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformBundle {
    network: String,
    station: String,
    components: BTreeMap<Component, ComponentTrace>,
}

impl WaveformBundle {
    pub fn new(network: impl Into<String>, station: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            components: BTreeMap::new(),
        }
    }

    pub fn with_component(mut self, component: Component, trace: ComponentTrace) -> Self {
        self.components.insert(component, trace);
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn component(&self, component: Component) -> Option<&ComponentTrace> {
        self.components.get(&component)
    }

    pub fn components(&self) -> impl Iterator<Item = (Component, &ComponentTrace)> {
        self.components.iter().map(|(c, t)| (*c, t))
    }

    /// New bundle whose time axes are offset by `offset_s` seconds.
    pub fn with_time_shift(&self, offset_s: f64) -> Self {
        let components = self
            .components
            .iter()
            .map(|(component, trace)| {
                let mut shifted = trace.clone();
                shifted.time_axis.iter_mut().for_each(|t| *t += offset_s);
                (*component, shifted)
            })
            .collect();
        Self {
            network: self.network.clone(),
            station: self.station.clone(),
            components,
        }
    }
}

/// Time window and channels to request for a full download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub channel_families: Vec<String>,
}

impl DownloadWindow {
    /// From one minute before origin to ten minutes after the surface waves.
    pub fn for_station(event: &EarthquakeEvent, station: &CandidateStation) -> Self {
        let origin = event.origin_time();
        let after_s = station.arrivals().surface_s + POST_SURFACE_S;
        Self {
            start: origin - seconds(PRE_EVENT_S),
            end: origin + seconds(after_s),
            channel_families: DOWNLOAD_CHANNEL_FAMILIES
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }

    pub fn duration_s(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

pub(crate) fn seconds(value: f64) -> Duration {
    Duration::milliseconds((value * 1000.0).round() as i64)
}
