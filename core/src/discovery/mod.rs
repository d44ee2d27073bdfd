//! Station discovery: catalog query, ranking, de-clustering and concurrent
//! availability checks for one earthquake.

pub mod catalog;
pub mod declutter;
pub mod fallback;
pub mod scoring;
pub mod verify;

pub use catalog::{
    CatalogCache, RawChannel, RawStation, RawTrace, StationCatalog, StationQuery,
    WaveformRequest, WaveformSource,
};

use crate::geodesy::TravelTimeModel;
use crate::prelude::{DiscoveryError, SourceError};
use crate::records::waveform::seconds;
use crate::records::{CandidateStation, EarthquakeEvent, StationOrigin, VerificationStatus};
use crate::telemetry::{LogManager, ProbeCounts, ProbeMetrics};
use declutter::{decluster, spread_indices};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use verify::{verify_availability, ProbeResult, ProbeSettings, ProbeTarget};

/// Tunables for [`StationDiscovery`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub max_workers: usize,
    pub probe_window_s: f64,
    pub probe_timeout_ms: u64,
    pub verification_budget_ms: u64,
    pub probe_channels: Vec<String>,
    pub catalog_attempts: usize,
    pub catalog_backoff_ms: u64,
    /// Half-width of the station operating window around the origin.
    pub query_window_s: f64,
    /// Above this many selected stations only a subset is probed.
    pub full_probe_limit: usize,
    pub quick_probe_cap: usize,
    pub cache_ttl_s: u64,
    pub cache_capacity: usize,
    /// Only searches reaching at most this far are cached.
    pub cache_max_distance_km: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            probe_window_s: 30.0,
            probe_timeout_ms: 5_000,
            verification_budget_ms: 60_000,
            probe_channels: vec!["HH?".into(), "BH?".into()],
            catalog_attempts: 3,
            catalog_backoff_ms: 2_000,
            query_window_s: 86_400.0,
            full_probe_limit: 20,
            quick_probe_cap: 15,
            cache_ttl_s: 86_400,
            cache_capacity: 50,
            cache_max_distance_km: 3_000.0,
        }
    }
}

/// Where the returned station list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListSource {
    Catalog,
    Cache,
    Fallback,
    /// The request itself was empty (no target or inverted annulus).
    NotQueried,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryOutcome {
    pub stations: Vec<CandidateStation>,
    pub source: ListSource,
    pub metrics: ProbeCounts,
}

pub struct StationDiscovery {
    catalog: Arc<dyn StationCatalog>,
    waveforms: Arc<dyn WaveformSource>,
    model: Arc<TravelTimeModel>,
    config: DiscoveryConfig,
    cache: CatalogCache,
    logger: LogManager,
}

impl StationDiscovery {
    pub fn new(
        catalog: Arc<dyn StationCatalog>,
        waveforms: Arc<dyn WaveformSource>,
        model: Arc<TravelTimeModel>,
        config: DiscoveryConfig,
    ) -> Self {
        let cache = CatalogCache::new(
            Duration::from_secs(config.cache_ttl_s),
            config.cache_capacity,
        );
        Self {
            catalog,
            waveforms,
            model,
            config,
            cache,
            logger: LogManager::new("discovery"),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Ranked stations for `event` between `min_distance_km` and
    /// `max_distance_km`, at most `target_count` long.
    ///
    /// Never fails: catalog outages fall back to the static station list and
    /// an empty list means no coverage.
    pub async fn discover_stations(
        &self,
        event: &EarthquakeEvent,
        min_distance_km: f64,
        max_distance_km: f64,
        target_count: usize,
    ) -> DiscoveryOutcome {
        let metrics = ProbeMetrics::new();
        let valid_range = min_distance_km.is_finite()
            && max_distance_km.is_finite()
            && min_distance_km <= max_distance_km;
        if target_count == 0 || !valid_range {
            self.logger.degraded(&format!(
                "nothing to discover: target {} range {}..{} km",
                target_count, min_distance_km, max_distance_km
            ));
            return DiscoveryOutcome {
                stations: Vec::new(),
                source: ListSource::NotQueried,
                metrics: metrics.snapshot(),
            };
        }

        let (candidates, source) = self
            .gather_candidates(event, min_distance_km, max_distance_km, &metrics)
            .await;
        if candidates.is_empty() {
            self.logger
                .record("no stations cover the requested range; returning an empty list");
            return DiscoveryOutcome {
                stations: Vec::new(),
                source,
                metrics: metrics.snapshot(),
            };
        }

        let mut selected = decluster(candidates, target_count);
        self.logger.record(&format!(
            "{} stations selected across {:.0}-{:.0} km",
            selected.len(),
            min_distance_km,
            max_distance_km
        ));

        if source != ListSource::Fallback {
            self.verify(event, &mut selected, target_count, &metrics).await;
        }

        DiscoveryOutcome {
            stations: final_ordering(selected, target_count),
            source,
            metrics: metrics.snapshot(),
        }
    }

    async fn gather_candidates(
        &self,
        event: &EarthquakeEvent,
        min_distance_km: f64,
        max_distance_km: f64,
        metrics: &ProbeMetrics,
    ) -> (Vec<CandidateStation>, ListSource) {
        let query = StationQuery::for_event(
            event,
            min_distance_km,
            max_distance_km,
            self.config.query_window_s,
        );
        let cacheable = max_distance_km <= self.config.cache_max_distance_km;

        let fetched = match cacheable.then(|| self.cache.get(&query)).flatten() {
            Some(stations) => {
                self.logger.detail("catalog answer served from cache");
                Ok((stations, ListSource::Cache))
            }
            None => self
                .fetch_with_retries(&query, metrics)
                .await
                .map(|stations| {
                    if cacheable {
                        self.cache.insert(&query, stations.clone());
                    }
                    (stations, ListSource::Catalog)
                }),
        };

        match fetched {
            Ok((stations, source)) => {
                let candidates = scoring::build_candidates(
                    stations,
                    event,
                    &self.model,
                    min_distance_km,
                    max_distance_km,
                    StationOrigin::Catalog,
                    &self.logger,
                );
                if !candidates.is_empty() {
                    return (candidates, source);
                }
                self.logger
                    .degraded("catalog returned no usable stations; using fallback list");
            }
            Err(err) => {
                self.logger.degraded(&format!(
                    "{} ({}); using fallback list",
                    err,
                    err.reason()
                ));
            }
        }

        let candidates = fallback::fallback_candidates(
            event,
            &self.model,
            min_distance_km,
            max_distance_km,
            &self.logger,
        );
        (candidates, ListSource::Fallback)
    }

    async fn fetch_with_retries(
        &self,
        query: &StationQuery,
        metrics: &ProbeMetrics,
    ) -> Result<Vec<RawStation>, DiscoveryError> {
        let attempts = self.config.catalog_attempts.max(1);
        let backoff = Duration::from_millis(self.config.catalog_backoff_ms);
        let mut last_error = SourceError::Unreachable("no attempt made".into());
        for attempt in 1..=attempts {
            metrics.record_catalog_attempt();
            match self.catalog.get_stations(query).await {
                Ok(stations) => return Ok(stations),
                Err(err) => {
                    self.logger.degraded(&format!(
                        "catalog attempt {}/{} failed: {}",
                        attempt, attempts, err
                    ));
                    last_error = err;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
            }
        }
        Err(DiscoveryError::CatalogUnavailable {
            attempts,
            last_error,
        })
    }

    async fn verify(
        &self,
        event: &EarthquakeEvent,
        selected: &mut [CandidateStation],
        target_count: usize,
        metrics: &ProbeMetrics,
    ) {
        let probe_indices = if selected.len() > self.config.full_probe_limit {
            let count = target_count
                .saturating_mul(3)
                .min(self.config.quick_probe_cap);
            self.logger.record(&format!(
                "quick validation: probing {} of {} stations",
                count,
                selected.len()
            ));
            spread_indices(selected.len(), count)
        } else {
            (0..selected.len()).collect()
        };

        let targets = probe_indices
            .into_iter()
            .map(|index| ProbeTarget {
                index,
                network: selected[index].network().to_string(),
                station: selected[index].station().to_string(),
            })
            .collect();
        let start = event.origin_time();
        let settings = ProbeSettings {
            workers: self.config.max_workers,
            window_start: start,
            window_end: start + seconds(self.config.probe_window_s),
            channel_patterns: self.config.probe_channels.clone(),
            attempt_timeout: Duration::from_millis(self.config.probe_timeout_ms),
            budget: Duration::from_millis(self.config.verification_budget_ms),
            stop_after_verified: target_count.saturating_mul(2),
        };

        let outcomes = verify_availability(
            Arc::clone(&self.waveforms),
            targets,
            settings,
            metrics,
            &self.logger,
        )
        .await;

        for (index, result) in outcomes {
            let Some(station) = selected.get_mut(index) else {
                continue;
            };
            let applied = match result {
                ProbeResult::Verified(pattern) => station.mark_verified(pattern),
                ProbeResult::Unavailable => station.mark_unavailable(),
            };
            if let Err(err) = applied {
                self.logger
                    .detail(&format!("{}: {}", station.id(), err));
            }
        }
    }
}

/// Verified, then unknown, then unavailable, each by ascending distance, cut
/// to `target_count`. A group that must be cut keeps evenly spaced picks so
/// the distance spread survives.
pub fn final_ordering(
    stations: Vec<CandidateStation>,
    target_count: usize,
) -> Vec<CandidateStation> {
    let mut groups: [Vec<CandidateStation>; 3] = Default::default();
    for station in stations {
        let group = match station.verification() {
            VerificationStatus::Verified => 0,
            VerificationStatus::Unknown => 1,
            VerificationStatus::Unavailable => 2,
        };
        groups[group].push(station);
    }

    let mut ordered = Vec::with_capacity(target_count);
    for mut group in groups {
        let room = target_count.saturating_sub(ordered.len());
        if room == 0 {
            break;
        }
        group.sort_by(|a, b| a.distance_km().total_cmp(&b.distance_km()));
        if group.len() <= room {
            ordered.extend(group);
        } else {
            let keep = spread_indices(group.len(), room);
            ordered.extend(
                group
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| keep.contains(i))
                    .map(|(_, s)| s),
            );
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCatalog {
        stations: Vec<RawStation>,
        failures_before_success: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StationCatalog for FixedCatalog {
        async fn get_stations(&self, _: &StationQuery) -> Result<Vec<RawStation>, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(SourceError::Unreachable("connection refused".into()))
            } else {
                Ok(self.stations.clone())
            }
        }
    }

    struct AlwaysData;

    #[async_trait]
    impl WaveformSource for AlwaysData {
        async fn get_waveforms(
            &self,
            request: &WaveformRequest,
        ) -> Result<Vec<RawTrace>, SourceError> {
            Ok(vec![RawTrace {
                network: request.network.clone(),
                station: request.station.clone(),
                location: "00".into(),
                channel: "HHZ".into(),
                start: request.start,
                sampling_rate: 100.0,
                sample_count: 3000,
                samples: Vec::new(),
            }])
        }
    }

    fn event() -> EarthquakeEvent {
        EarthquakeEvent::new(
            "synthetic",
            Utc.with_ymd_and_hms(2021, 8, 14, 12, 29, 8).unwrap(),
            0.0,
            0.0,
            10.0,
            7.2,
        )
        .unwrap()
    }

    fn station_at(code: &str, lon: f64) -> RawStation {
        RawStation {
            network: "XX".into(),
            station: code.into(),
            latitude: 0.0,
            longitude: lon,
            elevation_m: 0.0,
            start_date: None,
            channels: vec![RawChannel {
                code: "HHZ".into(),
                location: "00".into(),
                sample_rate: Some(100.0),
            }],
        }
    }

    fn fast_config() -> DiscoveryConfig {
        DiscoveryConfig {
            catalog_backoff_ms: 0,
            verification_budget_ms: 5_000,
            ..Default::default()
        }
    }

    fn engine(catalog: FixedCatalog) -> StationDiscovery {
        StationDiscovery::new(
            Arc::new(catalog),
            Arc::new(AlwaysData),
            Arc::new(TravelTimeModel::iasp91()),
            fast_config(),
        )
    }

    #[tokio::test]
    async fn returned_stations_span_the_distance_range() {
        // 15 stations evenly spread from 1000 to 10000 km
        let stations = (0..15)
            .map(|i| {
                let km = 1000.0 + i as f64 * (9000.0 / 14.0);
                station_at(&format!("S{:02}", i), km / 111.319_49)
            })
            .collect();
        let discovery = engine(FixedCatalog {
            stations,
            failures_before_success: 0,
            calls: AtomicUsize::new(0),
        });

        let outcome = discovery
            .discover_stations(&event(), 900.0, 10_100.0, 3)
            .await;
        assert_eq!(outcome.source, ListSource::Catalog);
        assert_eq!(outcome.stations.len(), 3);
        assert!(outcome
            .stations
            .iter()
            .all(|s| s.verification() == VerificationStatus::Verified));

        let distances: Vec<f64> = outcome.stations.iter().map(|s| s.distance_km()).collect();
        let span = distances.iter().cloned().fold(f64::MIN, f64::max)
            - distances.iter().cloned().fold(f64::MAX, f64::min);
        assert!(span >= 0.8 * 9000.0, "span {}", span);
        assert!(distances.iter().any(|d| *d > 1900.0));
    }

    #[tokio::test]
    async fn catalog_outage_falls_back_to_static_list() {
        let discovery = engine(FixedCatalog {
            stations: Vec::new(),
            failures_before_success: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let outcome = discovery
            .discover_stations(&event(), 0.0, 20_000.0, 5)
            .await;
        assert_eq!(outcome.source, ListSource::Fallback);
        assert_eq!(outcome.metrics.catalog_attempts, 3);
        assert_eq!(outcome.stations.len(), 5);
        assert!(outcome
            .stations
            .iter()
            .all(|s| s.origin() == StationOrigin::Fallback));
    }

    #[tokio::test]
    async fn transient_catalog_failure_is_retried() {
        let discovery = engine(FixedCatalog {
            stations: vec![station_at("ONE", 20.0)],
            failures_before_success: 2,
            calls: AtomicUsize::new(0),
        });
        let outcome = discovery
            .discover_stations(&event(), 100.0, 3000.0, 2)
            .await;
        assert_eq!(outcome.source, ListSource::Catalog);
        assert_eq!(outcome.metrics.catalog_attempts, 3);
        assert_eq!(outcome.stations[0].station(), "ONE");
    }

    #[tokio::test]
    async fn repeated_nearby_searches_use_the_cache() {
        let discovery = engine(FixedCatalog {
            stations: vec![station_at("ONE", 20.0)],
            failures_before_success: 0,
            calls: AtomicUsize::new(0),
        });
        let first = discovery.discover_stations(&event(), 100.0, 3000.0, 1).await;
        let second = discovery.discover_stations(&event(), 100.0, 3000.0, 1).await;
        assert_eq!(first.source, ListSource::Catalog);
        assert_eq!(second.source, ListSource::Cache);
        assert_eq!(second.metrics.catalog_attempts, 0);
    }

    #[tokio::test]
    async fn degenerate_requests_return_empty() {
        let discovery = engine(FixedCatalog {
            stations: vec![station_at("ONE", 20.0)],
            failures_before_success: 0,
            calls: AtomicUsize::new(0),
        });
        let zero = discovery.discover_stations(&event(), 0.0, 3000.0, 0).await;
        assert!(zero.stations.is_empty());
        let inverted = discovery.discover_stations(&event(), 3000.0, 100.0, 3).await;
        assert!(inverted.stations.is_empty());
        assert_eq!(inverted.source, ListSource::NotQueried);
    }

    #[tokio::test]
    async fn no_coverage_is_an_empty_list_not_an_error() {
        let discovery = engine(FixedCatalog {
            stations: Vec::new(),
            failures_before_success: 0,
            calls: AtomicUsize::new(0),
        });
        // a narrow annulus in the open ocean with no static station inside
        let outcome = discovery.discover_stations(&event(), 10.0, 20.0, 3).await;
        assert!(outcome.stations.is_empty());
        assert_eq!(outcome.source, ListSource::Fallback);
    }
}
