use crate::discovery::catalog::{RawChannel, RawStation};
use crate::geodesy::TravelTimeModel;
use crate::records::{CandidateStation, ChannelTier, EarthquakeEvent, StationOrigin, StationSite};
use crate::telemetry::LogManager;

/// Picks the best seismometer family: HH, then BH, then any other `?H?`.
/// Returns the two-letter family and its sampling rate.
pub fn select_channel_family(channels: &[RawChannel]) -> Option<(String, f64)> {
    let family_rate = |family: &str| -> Option<f64> {
        let rates: Vec<Option<f64>> = channels
            .iter()
            .filter(|c| c.code.len() == 3 && c.code.starts_with(family))
            .map(|c| c.sample_rate.filter(|r| r.is_finite() && *r > 0.0))
            .collect();
        if rates.is_empty() {
            return None;
        }
        let nominal = ChannelTier::for_family(family).nominal_rate();
        Some(rates.into_iter().flatten().reduce(f64::max).unwrap_or(nominal))
    };

    for family in ["HH", "BH"] {
        if let Some(rate) = family_rate(family) {
            return Some((family.to_string(), rate));
        }
    }

    let other = channels
        .iter()
        .find(|c| c.code.len() == 3 && c.code.as_bytes()[1] == b'H')?;
    let family = other.code[..2].to_string();
    let rate = family_rate(&family).unwrap_or(ChannelTier::Other.nominal_rate());
    Some((family, rate))
}

/// Turns inventory rows into ranked candidates inside `[min_km, max_km]`.
/// Stations without a qualifying channel, with invalid coordinates, or
/// outside the annulus are dropped. Output is in priority order.
pub fn build_candidates(
    stations: Vec<RawStation>,
    event: &EarthquakeEvent,
    model: &TravelTimeModel,
    min_distance_km: f64,
    max_distance_km: f64,
    origin: StationOrigin,
    log: &LogManager,
) -> Vec<CandidateStation> {
    let total = stations.len();
    let mut candidates: Vec<CandidateStation> = stations
        .into_iter()
        .filter_map(|raw| {
            let (channel_family, sampling_rate) = select_channel_family(&raw.channels)?;
            let site = StationSite {
                network: raw.network,
                station: raw.station,
                latitude: raw.latitude,
                longitude: raw.longitude,
                elevation_m: raw.elevation_m,
                start_date: raw.start_date,
                channel_family,
                sampling_rate,
            };
            match CandidateStation::derive(site, event, model, origin) {
                Ok(candidate) => Some(candidate),
                Err(err) => {
                    log.detail(&format!("skipping station: {}", err));
                    None
                }
            }
        })
        .filter(|c| c.distance_km() >= min_distance_km && c.distance_km() <= max_distance_km)
        .collect();

    candidates.sort_by(|a, b| a.priority().cmp(b.priority()));
    log.record(&format!(
        "{} of {} catalog stations qualify between {:.0} and {:.0} km",
        candidates.len(),
        total,
        min_distance_km,
        max_distance_km
    ));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn channel(code: &str, rate: Option<f64>) -> RawChannel {
        RawChannel {
            code: code.into(),
            location: "00".into(),
            sample_rate: rate,
        }
    }

    #[test]
    fn high_rate_family_wins_over_broadband() {
        let chosen = select_channel_family(&[
            channel("BHZ", Some(40.0)),
            channel("HHZ", Some(100.0)),
            channel("HHN", Some(100.0)),
        ]);
        assert_eq!(chosen, Some(("HH".to_string(), 100.0)));
    }

    #[test]
    fn missing_rates_use_nominal_class() {
        assert_eq!(
            select_channel_family(&[channel("BHZ", None)]),
            Some(("BH".to_string(), 40.0))
        );
        assert_eq!(
            select_channel_family(&[channel("SHZ", None)]),
            Some(("SH".to_string(), 20.0))
        );
        assert_eq!(
            select_channel_family(&[channel("EHZ", Some(50.0))]),
            Some(("EH".to_string(), 50.0))
        );
    }

    #[test]
    fn stations_without_seismometers_are_rejected() {
        assert_eq!(select_channel_family(&[channel("LDI", Some(1.0))]), None);
        assert_eq!(select_channel_family(&[]), None);
    }

    #[test]
    fn candidates_are_filtered_by_distance_and_ranked() {
        let event = EarthquakeEvent::new(
            "e",
            Utc.with_ymd_and_hms(2022, 9, 19, 18, 5, 0).unwrap(),
            0.0,
            0.0,
            15.0,
            7.6,
        )
        .unwrap();
        let raw = |network: &str, station: &str, lon: f64, code: &str| RawStation {
            network: network.into(),
            station: station.into(),
            latitude: 0.0,
            longitude: lon,
            elevation_m: 0.0,
            start_date: None,
            channels: vec![channel(code, None)],
        };
        let stations = vec![
            raw("XX", "FAR", 40.0, "HHZ"),
            raw("XX", "NEAR", 1.0, "HHZ"),
            raw("IU", "MID", 10.0, "BHZ"),
            raw("XX", "MID2", 12.0, "HHZ"),
            raw("II", "NOSEIS", 11.0, "LDI"),
        ];
        let candidates = build_candidates(
            stations,
            &event,
            &TravelTimeModel::iasp91(),
            500.0,
            3000.0,
            StationOrigin::Catalog,
            &LogManager::new("test"),
        );
        let ids: Vec<String> = candidates.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["IU.MID", "XX.MID2"]);
    }
}
