use crate::math::StatsHelper;
use crate::prelude::{ProcessingError, ProcessingStage, StageConfig, StageInput};
use crate::processing::filter::{AppliedFilter, FilterBand, DEFAULT_FILTER_ORDER};
use crate::processing::spikes::DEFAULT_SPIKE_THRESHOLD;
use crate::processing::stages::{BandFilterStage, SpikeStage};
use crate::records::{Component, ComponentTrace, WaveformBundle};
use crate::telemetry::LogManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    pub remove_spikes: bool,
    pub spike_threshold: f64,
    pub filter_order: usize,
    pub estimate_noise: bool,
    /// Leading seconds of filtered output used as the noise sample.
    pub noise_window_s: f64,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            remove_spikes: true,
            spike_threshold: DEFAULT_SPIKE_THRESHOLD,
            filter_order: DEFAULT_FILTER_ORDER,
            estimate_noise: false,
            noise_window_s: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentStatus {
    Filtered,
    /// No filter requested; output is the (cleaned) input.
    PassThrough,
    /// Filtering failed; output is the cleaned input.
    Failed(ProcessingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoiseEstimate {
    pub noise_level: f64,
    pub signal_level: f64,
    pub snr: f64,
}

impl NoiseEstimate {
    /// Noise is the std of the first `window_s` seconds, signal the peak |x|.
    pub fn measure(samples: &[f64], sampling_rate: f64, window_s: f64) -> Self {
        let window = ((window_s * sampling_rate) as usize).min(samples.len());
        let noise_level = StatsHelper::std_dev(&samples[..window]);
        let signal_level = StatsHelper::peak_abs(samples);
        let snr = if noise_level > 0.0 {
            signal_level / noise_level
        } else {
            0.0
        };
        Self {
            noise_level,
            signal_level,
            snr,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedComponent {
    /// The samples processing started from (displacement or raw).
    pub input: Vec<f64>,
    pub used_displacement: bool,
    pub output: Vec<f64>,
    pub spike_count: Option<usize>,
    /// Set when spike cleaning was requested but could not run; the
    /// component then continues from its uncleaned input.
    pub spike_error: Option<ProcessingError>,
    pub applied: Option<AppliedFilter>,
    pub status: ComponentStatus,
    pub noise: Option<NoiseEstimate>,
}

#[derive(Debug, Clone)]
pub struct ProcessedWaveform {
    pub band: FilterBand,
    pub components: BTreeMap<Component, ProcessedComponent>,
}

impl ProcessedWaveform {
    pub fn component(&self, component: Component) -> Option<&ProcessedComponent> {
        self.components.get(&component)
    }
}

fn process_component(
    trace: &ComponentTrace,
    band: &FilterBand,
    options: &ProcessOptions,
) -> ProcessedComponent {
    let config = StageConfig {
        sampling_rate: trace.sampling_rate(),
        filter_order: options.filter_order,
        spike_threshold: options.spike_threshold,
    };
    let input = trace.working_samples().to_vec();

    let mut spike_count = None;
    let mut spike_error = None;
    let mut cleaned = input.clone();
    if options.remove_spikes {
        let mut stage = SpikeStage::new();
        let result = stage
            .initialize(&config)
            .and_then(|_| stage.execute(StageInput { samples: input.clone() }));
        stage.cleanup();
        match result {
            Ok(output) => {
                spike_count = output.metadata.spike_count;
                cleaned = output.samples;
            }
            Err(err) => spike_error = Some(err),
        }
    }

    let mut stage = BandFilterStage::new(*band);
    let result = stage
        .initialize(&config)
        .and_then(|_| stage.execute(StageInput { samples: cleaned.clone() }));
    stage.cleanup();

    let (output, applied, status) = match result {
        Ok(out) => {
            let status = if out.metadata.applied_filter.is_some() {
                ComponentStatus::Filtered
            } else {
                ComponentStatus::PassThrough
            };
            (out.samples, out.metadata.applied_filter, status)
        }
        Err(err) => (cleaned, None, ComponentStatus::Failed(err)),
    };

    let noise = (options.estimate_noise && !matches!(status, ComponentStatus::Failed(_)))
        .then(|| NoiseEstimate::measure(&output, trace.sampling_rate(), options.noise_window_s));

    ProcessedComponent {
        input,
        used_displacement: trace.is_calibrated(),
        output,
        spike_count,
        spike_error,
        applied,
        status,
        noise,
    }
}

/// Cleans, filters and measures each component of `bundle` independently.
/// A component whose filter fails keeps its cleaned samples and records the
/// failure in its status; the other components are unaffected.
pub fn process_waveform(
    bundle: &WaveformBundle,
    band: &FilterBand,
    options: &ProcessOptions,
) -> ProcessedWaveform {
    let logger = LogManager::new("waveform");
    let mut components = BTreeMap::new();
    for (component, trace) in bundle.components() {
        let processed = process_component(trace, band, options);
        if let Some(err) = &processed.spike_error {
            logger.degraded(&format!(
                "{}.{} {:?}: spike cleaning skipped ({}): {}",
                bundle.network(),
                bundle.station(),
                component,
                err.reason(),
                err
            ));
        }
        if let ComponentStatus::Failed(err) = &processed.status {
            logger.degraded(&format!(
                "{}.{} {:?}: filter failed ({}): {}",
                bundle.network(),
                bundle.station(),
                component,
                err.reason(),
                err
            ));
        }
        components.insert(component, processed);
    }
    ProcessedWaveform {
        band: *band,
        components,
    }
}
