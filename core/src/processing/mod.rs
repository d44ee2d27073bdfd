pub mod filter;
pub mod magnitude;
pub mod spectral;
pub mod spikes;
pub mod stages;
pub mod timing;
pub mod waveform;

pub use filter::{apply_band_filter, AppliedFilter, BandPreset, FilterBand, FilteredTrace};
pub use magnitude::{
    calculate_ms_for_bundle, calculate_ms_magnitude, surface_wave_window, DominantComponent,
    MagnitudeExplanation, MagnitudeResult,
};
pub use spectral::{spectral_peak_period, PeriodQuality, SpectralPeak, DEFAULT_TARGET_BAND_S};
pub use spikes::remove_spikes;
pub use stages::{BandFilterStage, SpikeStage};
pub use timing::{correct_timing, validate_timing, ArrivalPick, ArrivalPicker};
pub use waveform::{process_waveform, ComponentStatus, ProcessOptions, ProcessedWaveform};
