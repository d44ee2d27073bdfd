//! Typed records shared by the discovery and processing engines.

pub mod earthquake;
pub mod station;
pub mod waveform;

pub use earthquake::{EarthquakeEvent, EventKey};
pub use station::{
    network_tier, ArrivalSource, ArrivalTimes, CandidateStation, ChannelTier, PriorityKey,
    StationOrigin, StationSite, VerificationStatus,
};
pub use waveform::{Component, ComponentTrace, DownloadWindow, WaveformBundle};
