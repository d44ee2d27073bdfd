use crate::geodesy::{distance_and_azimuth, km_to_degrees, Phase, TravelTimeModel};
use crate::prelude::RecordError;
use crate::records::EarthquakeEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;

/// Channel-quality tier of the best instrument family a station offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelTier {
    /// HH?, high-rate broadband (~100 Hz).
    HighRate = 1,
    /// BH?, broadband (~40 Hz).
    Broadband = 2,
    /// Any other ?H? family.
    Other = 3,
}

impl ChannelTier {
    pub fn for_family(family: &str) -> Self {
        match family {
            "HH" => ChannelTier::HighRate,
            "BH" => ChannelTier::Broadband,
            _ => ChannelTier::Other,
        }
    }

    /// Nominal sampling-rate class (Hz) when the catalog gives none.
    pub fn nominal_rate(self) -> f64 {
        match self {
            ChannelTier::HighRate => 100.0,
            ChannelTier::Broadband => 40.0,
            ChannelTier::Other => 20.0,
        }
    }

    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Reputation tier of a network code; lower is better.
pub fn network_tier(network: &str) -> u8 {
    match network {
        "II" => 0,
        "IU" => 1,
        "G" | "GE" => 2,
        "GT" => 3,
        "US" | "CN" => 4,
        _ => 99,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStatus {
    Unknown,
    Verified,
    Unavailable,
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StationOrigin {
    Catalog,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrivalSource {
    Model,
    ConstantVelocity,
}

/// Theoretical arrivals in seconds after origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrivalTimes {
    pub p_s: f64,
    pub s_s: f64,
    pub surface_s: f64,
    pub p_source: ArrivalSource,
    pub s_source: ArrivalSource,
}

impl ArrivalTimes {
    pub fn derive(model: &TravelTimeModel, depth_km: f64, distance_km: f64) -> Self {
        let lookup = |phase: Phase| match crate::geodesy::theoretical_arrival(
            model,
            depth_km,
            distance_km,
            phase,
        ) {
            Some(t) => (t, ArrivalSource::Model),
            None => (
                phase.constant_velocity_estimate(distance_km),
                ArrivalSource::ConstantVelocity,
            ),
        };
        let (p_s, p_source) = lookup(Phase::P);
        let (s_s, s_source) = lookup(Phase::S);
        Self {
            p_s,
            s_s,
            surface_s: Phase::Surface.constant_velocity_estimate(distance_km),
            p_source,
            s_source,
        }
    }
}

/// Ranking key: network tier asc, channel tier asc, operational years desc,
/// distance asc.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityKey {
    pub network_tier: u8,
    pub channel_tier: ChannelTier,
    pub operational_years: f64,
    pub distance_km: f64,
}

impl Eq for PriorityKey {}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.network_tier
            .cmp(&other.network_tier)
            .then(self.channel_tier.cmp(&other.channel_tier))
            .then(other.operational_years.total_cmp(&self.operational_years))
            .then(self.distance_km.total_cmp(&other.distance_km))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Catalog facts about a station before anything is derived from the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSite {
    pub network: String,
    pub station: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    pub start_date: Option<DateTime<Utc>>,
    /// Two-letter band/instrument code, e.g. `HH`.
    pub channel_family: String,
    pub sampling_rate: f64,
}

/// A station considered for one event. Geometry, arrivals and ranking are
/// derived at construction; only the verification status changes later.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateStation {
    site: StationSite,
    distance_km: f64,
    distance_deg: f64,
    azimuth_deg: f64,
    channel_tier: ChannelTier,
    arrivals: ArrivalTimes,
    priority: PriorityKey,
    origin: StationOrigin,
    verification: VerificationStatus,
    verified_channels: Option<String>,
}

impl CandidateStation {
    pub fn derive(
        site: StationSite,
        event: &EarthquakeEvent,
        model: &TravelTimeModel,
        origin: StationOrigin,
    ) -> Result<Self, RecordError> {
        if !(-90.0..=90.0).contains(&site.latitude) {
            return Err(RecordError::Latitude(site.latitude));
        }
        if !(-180.0..=180.0).contains(&site.longitude) {
            return Err(RecordError::Longitude(site.longitude));
        }
        if !site.sampling_rate.is_finite() || site.sampling_rate <= 0.0 {
            return Err(RecordError::SamplingRate(site.sampling_rate));
        }

        let (distance_km, azimuth_deg) = distance_and_azimuth(
            event.latitude(),
            event.longitude(),
            site.latitude,
            site.longitude,
        );
        let channel_tier = ChannelTier::for_family(&site.channel_family);
        let operational_years = site
            .start_date
            .map(|start| {
                let seconds = (event.origin_time() - start).num_seconds() as f64;
                (seconds / SECONDS_PER_YEAR).max(0.0)
            })
            .unwrap_or(0.0);

        Ok(Self {
            distance_deg: km_to_degrees(distance_km),
            arrivals: ArrivalTimes::derive(model, event.depth_km(), distance_km),
            priority: PriorityKey {
                network_tier: network_tier(&site.network),
                channel_tier,
                operational_years,
                distance_km,
            },
            site,
            distance_km,
            azimuth_deg,
            channel_tier,
            origin,
            verification: VerificationStatus::Unknown,
            verified_channels: None,
        })
    }

    /// `NET.STA`.
    pub fn id(&self) -> String {
        format!("{}.{}", self.site.network, self.site.station)
    }

    pub fn network(&self) -> &str {
        &self.site.network
    }

    pub fn station(&self) -> &str {
        &self.site.station
    }

    pub fn latitude(&self) -> f64 {
        self.site.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.site.longitude
    }

    pub fn elevation_m(&self) -> f64 {
        self.site.elevation_m
    }

    pub fn channel_family(&self) -> &str {
        &self.site.channel_family
    }

    pub fn sampling_rate(&self) -> f64 {
        self.site.sampling_rate
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn distance_deg(&self) -> f64 {
        self.distance_deg
    }

    pub fn azimuth_deg(&self) -> f64 {
        self.azimuth_deg
    }

    pub fn channel_tier(&self) -> ChannelTier {
        self.channel_tier
    }

    pub fn arrivals(&self) -> &ArrivalTimes {
        &self.arrivals
    }

    pub fn priority(&self) -> &PriorityKey {
        &self.priority
    }

    pub fn origin(&self) -> StationOrigin {
        self.origin
    }

    pub fn verification(&self) -> VerificationStatus {
        self.verification
    }

    /// Channel pattern that confirmed availability, e.g. `HH?`.
    pub fn verified_channels(&self) -> Option<&str> {
        self.verified_channels.as_deref()
    }

    pub fn mark_verified(&mut self, channels: impl Into<String>) -> Result<(), RecordError> {
        self.transition(VerificationStatus::Verified)?;
        self.verified_channels = Some(channels.into());
        Ok(())
    }

    pub fn mark_unavailable(&mut self) -> Result<(), RecordError> {
        self.transition(VerificationStatus::Unavailable)
    }

    fn transition(&mut self, next: VerificationStatus) -> Result<(), RecordError> {
        if self.verification != VerificationStatus::Unknown {
            return Err(RecordError::AlreadyVerified(self.verification));
        }
        self.verification = next;
        Ok(())
    }
}
