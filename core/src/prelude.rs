use serde::{Deserialize, Serialize};

/// Shared configuration for each processing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub sampling_rate: f64,
    pub filter_order: usize,
    pub spike_threshold: f64,
}

/// Input payload for a processing stage.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub samples: Vec<f64>,
}

/// Output produced by each stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub samples: Vec<f64>,
    pub metadata: StageMetadata,
}

/// Metadata used for chaining stages and reporting.
#[derive(Debug, Clone, Default)]
pub struct StageMetadata {
    pub spike_count: Option<usize>,
    pub applied_filter: Option<crate::processing::filter::AppliedFilter>,
    pub notes: Vec<String>,
}

/// Failures of the signal processing engine.
///
/// Every variant is a tagged, recoverable outcome: callers receive either a
/// value or one of these, never a panic.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("invalid band: low {low:?} Hz must be below high {high:?} Hz")]
    InvalidBand { low: Option<f64>, high: Option<f64> },
    #[error("frequency {frequency_hz:.3} Hz is too close to Nyquist ({nyquist_hz:.3} Hz)")]
    FrequencyTooHigh { frequency_hz: f64, nyquist_hz: f64 },
    #[error("filter unstable: {0}")]
    FilterUnstable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("distance {distance_km:.0} km is below the 200 km Ms lower bound")]
    DistanceTooShort { distance_km: f64 },
    #[error("distance {distance_km:.0} km is beyond the 16000 km Ms upper bound")]
    DistanceTooLong { distance_km: f64 },
    #[error("sampling rate {sampling_rate} Hz is too low for Ms (needs at least 1 Hz)")]
    SamplingRateTooLow { sampling_rate: f64 },
    #[error("stage not initialized")]
    NotInitialized,
}

impl ProcessingError {
    /// Stable machine-readable tag for the failure.
    pub fn reason(&self) -> &'static str {
        match self {
            ProcessingError::InvalidBand { .. } => "invalid_band",
            ProcessingError::FrequencyTooHigh { .. } => "frequency_too_high",
            ProcessingError::FilterUnstable(_) => "filter_unstable",
            ProcessingError::InvalidInput(_) => "invalid_input",
            ProcessingError::DistanceTooShort { .. } => "distance_too_short",
            ProcessingError::DistanceTooLong { .. } => "distance_too_long",
            ProcessingError::SamplingRateTooLow { .. } => "sampling_rate_too_low",
            ProcessingError::NotInitialized => "not_initialized",
        }
    }
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;
pub type StageResult<T> = ProcessingResult<T>;

/// Failures reported by the external catalog and waveform collaborators.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("service unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Failures of the station discovery engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    #[error("station catalog unavailable after {attempts} attempt(s): {last_error}")]
    CatalogUnavailable { attempts: usize, last_error: SourceError },
}

impl DiscoveryError {
    pub fn reason(&self) -> &'static str {
        match self {
            DiscoveryError::CatalogUnavailable { .. } => "catalog_unavailable",
        }
    }
}

/// Constructor validation failures for the typed records.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
    #[error("depth {0} km is not a finite non-negative value")]
    Depth(f64),
    #[error("sampling rate {0} Hz must be finite and positive")]
    SamplingRate(f64),
    #[error("{component}: {field} has {actual} samples, expected {expected}")]
    LengthMismatch {
        component: String,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("verification status already set to {0:?}")]
    AlreadyVerified(crate::records::VerificationStatus),
}

/// Trait describing chained signal-processing stages.
pub trait ProcessingStage {
    fn initialize(&mut self, config: &StageConfig) -> StageResult<()>;
    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput>;
    fn cleanup(&mut self);
}
