use crate::fdsn::FdsnConfig;
use anyhow::{ensure, Context};
use seiscore::processing::{BandPreset, ProcessOptions};
use seiscore::DiscoveryConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub min_distance_km: f64,
    pub max_distance_km: f64,
    pub target_count: usize,
    pub band: BandPreset,
    pub processing: ProcessOptions,
    pub discovery: DiscoveryConfig,
    pub fdsn: FdsnConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            min_distance_km: 500.0,
            max_distance_km: 3_000.0,
            target_count: 10,
            band: BandPreset::Surface,
            processing: ProcessOptions::default(),
            discovery: DiscoveryConfig::default(),
            fdsn: FdsnConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_args(
        min_distance_km: f64,
        max_distance_km: f64,
        target_count: usize,
        band: BandPreset,
    ) -> Self {
        Self {
            min_distance_km,
            max_distance_km,
            target_count,
            band,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.min_distance_km <= self.max_distance_km,
            "min_distance_km {} exceeds max_distance_km {}",
            self.min_distance_km,
            self.max_distance_km
        );
        ensure!(self.discovery.max_workers > 0, "discovery.max_workers must be positive");
        let threshold = self.processing.spike_threshold;
        ensure!(
            threshold.is_finite() && threshold > 0.0,
            "processing.spike_threshold {} must be positive",
            threshold
        );
        ensure!(self.processing.filter_order > 0, "processing.filter_order must be positive");
        Ok(())
    }
}
