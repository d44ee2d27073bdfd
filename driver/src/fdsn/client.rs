use crate::fdsn::mseed::scan_records;
use crate::fdsn::text::{parse_channel_text, parse_event_text};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, TimeZone, Utc};
use reqwest::StatusCode;
use seiscore::discovery::{
    RawStation, RawTrace, StationCatalog, StationQuery, WaveformRequest, WaveformSource,
};
use seiscore::records::EarthquakeEvent;
use seiscore::SourceError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FdsnConfig {
    pub station_url: String,
    pub dataselect_url: String,
    pub event_url: String,
    pub request_timeout_s: u64,
}

impl Default for FdsnConfig {
    fn default() -> Self {
        Self {
            station_url: "https://service.iris.edu/fdsnws/station/1/query".into(),
            dataselect_url: "https://service.iris.edu/fdsnws/dataselect/1/query".into(),
            event_url: "https://service.iris.edu/fdsnws/event/1/query".into(),
            request_timeout_s: 30,
        }
    }
}

/// Catalog search for recent earthquakes.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub min_magnitude: f64,
    pub max_magnitude: f64,
    pub min_depth_km: f64,
    pub max_depth_km: f64,
    pub limit: usize,
}

impl EventQuery {
    pub const DEFAULT_DAYS: i64 = 180;

    /// Events of the last `days` days ending at `now`, M6+ at any depth.
    pub fn recent(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: now - ChronoDuration::days(days.max(1)),
            end: now,
            min_magnitude: 6.0,
            max_magnitude: 10.0,
            min_depth_km: 0.0,
            max_depth_km: 700.0,
            limit: 100,
        }
    }

    /// Whole calendar years, inclusive at both ends.
    pub fn years(first: i32, last: i32) -> Option<Self> {
        let start = Utc.with_ymd_and_hms(first, 1, 1, 0, 0, 0).single()?;
        let end = Utc.with_ymd_and_hms(last, 12, 31, 23, 59, 59).single()?;
        (start <= end).then(|| Self {
            start,
            end,
            ..Self::recent(end, Self::DEFAULT_DAYS)
        })
    }
}

/// FDSN web-service adapter for the station inventory and waveform probes.
#[derive(Clone)]
pub struct FdsnClient {
    http: reqwest::Client,
    config: FdsnConfig,
}

fn fdsn_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
        .trim_end_matches('Z')
        .to_string()
}

fn request_error(err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Unreachable(err.to_string())
    }
}

/// FDSN services answer "no data" with 204 (or 404 when `nodata=404`).
fn is_no_data(status: StatusCode) -> bool {
    status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND
}

impl FdsnClient {
    pub fn new(config: FdsnConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_s.max(1)))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn station_params(query: &StationQuery) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", format!("{:.4}", query.latitude)),
            ("longitude", format!("{:.4}", query.longitude)),
            ("minradius", format!("{:.4}", query.min_radius_deg)),
            ("maxradius", format!("{:.4}", query.max_radius_deg)),
            ("starttime", fdsn_time(query.start)),
            ("endtime", fdsn_time(query.end)),
            ("channel", query.channels.clone()),
            ("level", "channel".into()),
            ("format", "text".into()),
        ]
    }

    pub fn event_params(query: &EventQuery) -> Vec<(&'static str, String)> {
        vec![
            ("starttime", fdsn_time(query.start)),
            ("endtime", fdsn_time(query.end)),
            ("minmagnitude", format!("{:.1}", query.min_magnitude)),
            ("maxmagnitude", format!("{:.1}", query.max_magnitude)),
            ("mindepth", format!("{:.1}", query.min_depth_km)),
            ("maxdepth", format!("{:.1}", query.max_depth_km)),
            ("orderby", "time".into()),
            ("limit", query.limit.to_string()),
            ("format", "text".into()),
        ]
    }

    /// Recent earthquakes from the event service, newest first.
    pub async fn get_events(
        &self,
        query: &EventQuery,
    ) -> Result<Vec<EarthquakeEvent>, SourceError> {
        let response = self
            .http
            .get(&self.config.event_url)
            .query(&Self::event_params(query))
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if is_no_data(status) {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(SourceError::Unreachable(format!("event service: {}", status)));
        }
        let body = response.text().await.map_err(request_error)?;
        Ok(parse_event_text(&body))
    }

    pub fn dataselect_params(request: &WaveformRequest) -> Vec<(&'static str, String)> {
        let location = if request.location.is_empty() {
            "--".to_string()
        } else {
            request.location.clone()
        };
        vec![
            ("net", request.network.clone()),
            ("sta", request.station.clone()),
            ("loc", location),
            ("cha", request.channel.clone()),
            ("starttime", fdsn_time(request.start)),
            ("endtime", fdsn_time(request.end)),
        ]
    }
}

#[async_trait]
impl StationCatalog for FdsnClient {
    async fn get_stations(&self, query: &StationQuery) -> Result<Vec<RawStation>, SourceError> {
        let response = self
            .http
            .get(&self.config.station_url)
            .query(&Self::station_params(query))
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if is_no_data(status) {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(SourceError::Unreachable(format!("station service: {}", status)));
        }
        let body = response.text().await.map_err(request_error)?;
        Ok(parse_channel_text(&body))
    }
}

#[async_trait]
impl WaveformSource for FdsnClient {
    async fn get_waveforms(&self, request: &WaveformRequest) -> Result<Vec<RawTrace>, SourceError> {
        let response = self
            .http
            .get(&self.config.dataselect_url)
            .query(&Self::dataselect_params(request))
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if is_no_data(status) {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(SourceError::Unreachable(format!("dataselect: {}", status)));
        }
        let body = response.bytes().await.map_err(request_error)?;
        scan_records(&body).map_err(|e| SourceError::Malformed(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(location: &str) -> WaveformRequest {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        WaveformRequest {
            network: "IU".into(),
            station: "ANMO".into(),
            location: location.into(),
            channel: "HH?".into(),
            start,
            end: start + chrono::Duration::seconds(30),
        }
    }

    #[test]
    fn blank_location_is_sent_as_dashes() {
        let params = FdsnClient::dataselect_params(&request(""));
        assert!(params.contains(&("loc", "--".to_string())));
        let params = FdsnClient::dataselect_params(&request("00"));
        assert!(params.contains(&("loc", "00".to_string())));
        assert!(params.contains(&("endtime", "2024-01-01T00:00:30".to_string())));
    }

    #[test]
    fn no_data_statuses() {
        assert!(is_no_data(StatusCode::NO_CONTENT));
        assert!(is_no_data(StatusCode::NOT_FOUND));
        assert!(!is_no_data(StatusCode::OK));
    }

    #[test]
    fn event_query_covers_recent_large_events() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let query = EventQuery::recent(now, EventQuery::DEFAULT_DAYS);
        assert_eq!((query.end - query.start).num_days(), 180);
        let params = FdsnClient::event_params(&query);
        assert!(params.contains(&("starttime", "2024-01-03T12:00:00".to_string())));
        assert!(params.contains(&("minmagnitude", "6.0".to_string())));
        assert!(params.contains(&("maxdepth", "700.0".to_string())));
        assert!(params.contains(&("orderby", "time".to_string())));
        assert!(params.contains(&("limit", "100".to_string())));
    }

    #[test]
    fn year_range_spans_whole_years() {
        let query = EventQuery::years(2020, 2021).unwrap();
        assert_eq!(query.start, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(query.end, Utc.with_ymd_and_hms(2021, 12, 31, 23, 59, 59).unwrap());
        assert_eq!(query.min_magnitude, 6.0);
        assert!(EventQuery::years(2022, 2021).is_none());
    }

    #[test]
    fn default_config_points_at_fdsn_services() {
        let config = FdsnConfig::default();
        assert!(config.station_url.ends_with("/fdsnws/station/1/query"));
        assert!(config.event_url.ends_with("/fdsnws/event/1/query"));
        assert!(FdsnClient::new(config).is_ok());
    }
}
