//! Station discovery and surface-wave signal processing for seismic events.
//!
//! The discovery engine finds stations around an earthquake and confirms that
//! they have data; the processing engine cleans, filters and measures the
//! waveforms those stations deliver, ending in an Ms magnitude estimate.

pub mod discovery;
pub mod geodesy;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod records;
pub mod telemetry;

pub use discovery::{DiscoveryConfig, DiscoveryOutcome, StationDiscovery};
pub use geodesy::{distance_and_azimuth, theoretical_arrival, Phase, TravelTimeModel};
pub use prelude::{
    DiscoveryError, ProcessingError, ProcessingResult, ProcessingStage, RecordError, SourceError,
    StageConfig, StageInput, StageOutput,
};
pub use processing::{
    apply_band_filter, calculate_ms_magnitude, process_waveform, remove_spikes,
    spectral_peak_period,
};
