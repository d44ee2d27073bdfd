//! Contracts for the external station inventory and waveform services, plus
//! the in-memory cache of catalog answers.

use crate::geodesy::km_to_degrees;
use crate::prelude::SourceError;
use crate::records::EarthquakeEvent;
use crate::records::waveform::seconds;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Channel patterns accepted when searching the inventory.
pub const QUALIFYING_CHANNELS: &str = "BH?,HH?,SH?,EH?";

/// Radial inventory search around an epicentre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub min_radius_deg: f64,
    pub max_radius_deg: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub channels: String,
}

impl StationQuery {
    /// Stations operating within `window_s` of the origin, in the annulus.
    pub fn for_event(
        event: &EarthquakeEvent,
        min_distance_km: f64,
        max_distance_km: f64,
        window_s: f64,
    ) -> Self {
        Self {
            latitude: event.latitude(),
            longitude: event.longitude(),
            min_radius_deg: km_to_degrees(min_distance_km),
            max_radius_deg: km_to_degrees(max_distance_km),
            start: event.origin_time() - seconds(window_s),
            end: event.origin_time() + seconds(window_s),
            channels: QUALIFYING_CHANNELS.to_string(),
        }
    }

    pub fn cache_key(&self) -> String {
        format!(
            "{:.4}/{:.4}/{:.4}-{:.4}/{}-{}/{}",
            self.latitude,
            self.longitude,
            self.min_radius_deg,
            self.max_radius_deg,
            self.start.timestamp(),
            self.end.timestamp(),
            self.channels
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChannel {
    pub code: String,
    pub location: String,
    pub sample_rate: Option<f64>,
}

/// Inventory answer for one station, channels included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStation {
    pub network: String,
    pub station: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    pub start_date: Option<DateTime<Utc>>,
    pub channels: Vec<RawChannel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformRequest {
    pub network: String,
    pub station: String,
    pub location: String,
    /// Channel pattern, e.g. `HH?`.
    pub channel: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One contiguous trace returned by the waveform service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrace {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub start: DateTime<Utc>,
    pub sampling_rate: f64,
    pub sample_count: usize,
    /// Decoded samples; may be empty when only headers were inspected.
    pub samples: Vec<f64>,
}

#[async_trait]
pub trait StationCatalog: Send + Sync {
    async fn get_stations(&self, query: &StationQuery) -> Result<Vec<RawStation>, SourceError>;
}

#[async_trait]
pub trait WaveformSource: Send + Sync {
    async fn get_waveforms(&self, request: &WaveformRequest) -> Result<Vec<RawTrace>, SourceError>;
}

struct CacheEntry {
    stored: Instant,
    stations: Vec<RawStation>,
}

/// Bounded, time-limited cache of catalog answers keyed by query.
pub struct CatalogCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CatalogCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, query: &StationQuery) -> Option<Vec<RawStation>> {
        let mut entries = self.entries.lock().ok()?;
        let key = query.cache_key();
        let fresh = entries
            .get(&key)
            .map(|entry| entry.stored.elapsed() < self.ttl)?;
        if fresh {
            entries.get(&key).map(|entry| entry.stations.clone())
        } else {
            entries.remove(&key);
            None
        }
    }

    pub fn insert(&self, query: &StationQuery, stations: Vec<RawStation>) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let key = query.cache_key();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                stored: Instant::now(),
                stations,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
