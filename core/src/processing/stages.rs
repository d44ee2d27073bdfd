use crate::prelude::{
    ProcessingError, ProcessingStage, StageConfig, StageInput, StageMetadata, StageOutput,
    StageResult,
};
use crate::processing::filter::{apply_band_filter, FilterBand};
use crate::processing::spikes::remove_spikes;
use crate::telemetry::log::LogManager;

/// MAD-based spike suppression.
pub struct SpikeStage {
    config: Option<StageConfig>,
    logger: LogManager,
}

impl SpikeStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new("spikes"),
        }
    }
}

impl Default for SpikeStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for SpikeStage {
    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        if config.spike_threshold.is_nan() || config.spike_threshold <= 0.0 {
            return Err(ProcessingError::InvalidInput(format!(
                "spike threshold {} must be positive",
                config.spike_threshold
            )));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let config = self.config.as_ref().ok_or(ProcessingError::NotInitialized)?;
        let (samples, spike_count) = remove_spikes(&input.samples, config.spike_threshold);
        if spike_count > 0 {
            self.logger.detail(&format!("replaced {} spikes", spike_count));
        }
        Ok(StageOutput {
            samples,
            metadata: StageMetadata {
                spike_count: Some(spike_count),
                ..Default::default()
            },
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

/// Zero-phase band filter; passes samples through for [`FilterBand::Unfiltered`].
pub struct BandFilterStage {
    band: FilterBand,
    config: Option<StageConfig>,
}

impl BandFilterStage {
    pub fn new(band: FilterBand) -> Self {
        Self { band, config: None }
    }
}

impl ProcessingStage for BandFilterStage {
    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let config = self.config.as_ref().ok_or(ProcessingError::NotInitialized)?;
        match self.band {
            FilterBand::Unfiltered => Ok(StageOutput {
                samples: input.samples,
                metadata: StageMetadata {
                    notes: vec!["unfiltered".into()],
                    ..Default::default()
                },
            }),
            FilterBand::Corners { low, high } => {
                let filtered = apply_band_filter(
                    &input.samples,
                    config.sampling_rate,
                    low,
                    high,
                    config.filter_order,
                )?;
                Ok(StageOutput {
                    samples: filtered.samples,
                    metadata: StageMetadata {
                        notes: filtered.applied.adjustments.clone(),
                        applied_filter: Some(filtered.applied),
                        ..Default::default()
                    },
                })
            }
        }
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
