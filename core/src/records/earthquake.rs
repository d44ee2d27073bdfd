use crate::prelude::RecordError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Identity of an event: external identifier plus origin time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventKey {
    pub event_id: String,
    pub origin_time: DateTime<Utc>,
}

/// Immutable earthquake record; built through [`EarthquakeEvent::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarthquakeEvent {
    event_id: String,
    origin_time: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    depth_km: f64,
    magnitude: f64,
    magnitude_type: String,
    location: String,
}

impl EarthquakeEvent {
    pub fn new(
        event_id: impl Into<String>,
        origin_time: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        depth_km: f64,
        magnitude: f64,
    ) -> Result<Self, RecordError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(RecordError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(RecordError::Longitude(longitude));
        }
        if !depth_km.is_finite() || depth_km < 0.0 {
            return Err(RecordError::Depth(depth_km));
        }
        Ok(Self {
            event_id: event_id.into(),
            origin_time,
            latitude,
            longitude,
            depth_km,
            magnitude,
            magnitude_type: "M".into(),
            location: String::new(),
        })
    }

    /// Attaches the catalog's magnitude type and free-text region.
    pub fn with_description(
        mut self,
        magnitude_type: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        self.magnitude_type = magnitude_type.into();
        self.location = location.into();
        self
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            event_id: self.event_id.clone(),
            origin_time: self.origin_time,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn origin_time(&self) -> DateTime<Utc> {
        self.origin_time
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn depth_km(&self) -> f64 {
        self.depth_km
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn magnitude_type(&self) -> &str {
        &self.magnitude_type
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}
