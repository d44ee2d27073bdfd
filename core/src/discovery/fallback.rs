//! Well-known long-running broadband stations used when the catalog is down
//! or returns nothing in range.

use crate::discovery::scoring::build_candidates;
use crate::discovery::catalog::{RawChannel, RawStation};
use crate::geodesy::TravelTimeModel;
use crate::records::{CandidateStation, EarthquakeEvent, StationOrigin};
use crate::telemetry::LogManager;

/// (network, station, latitude, longitude, elevation m)
const FALLBACK_STATIONS: &[(&str, &str, f64, f64, f64)] = &[
    ("IU", "KEV", 69.7565, 27.0035, 80.0),
    ("II", "BFO", 48.3319, 8.3311, 589.0),
    ("GE", "STU", 48.7708, 9.1933, 360.0),
    ("DK", "BSD", 55.1139, 14.9147, 88.0),
    ("DK", "COP", 55.6853, 12.4325, 13.0),
    ("NS", "BSEG", 62.2037, 5.2193, 40.0),
    ("UP", "UDD", 64.5141, 21.0419, 220.0),
    ("IU", "ANMO", 34.9459, -106.4572, 1850.0),
    ("IU", "COLA", 64.8736, -147.8616, 200.0),
    ("II", "PFO", 33.6107, -116.4555, 1280.0),
    ("IU", "HRV", 42.5064, -71.5583, 200.0),
    ("IU", "SSPA", 40.6358, -77.8876, 270.0),
    ("IU", "CTAO", -20.0882, 146.2545, 357.0),
    ("IU", "MAJO", 36.5457, 138.2041, 405.0),
    ("IU", "TATO", 24.9735, 121.4971, 53.0),
    ("IU", "SNZO", -41.3087, 174.7043, 20.0),
    ("IU", "LVC", -22.6127, -68.9111, 2915.0),
    ("II", "KURK", 50.7154, 78.6202, 184.0),
    ("IU", "KONO", 59.6491, 9.5982, 216.0),
    ("IU", "PAB", 39.5446, -4.3499, 950.0),
    ("II", "SUR", -32.3797, 20.8117, 1770.0),
    ("IU", "GUMO", 13.5893, 144.8684, 74.0),
    ("IU", "HNR", -9.4387, 159.9475, 0.0),
    ("IU", "KIP", 21.4233, -158.015, 70.0),
];

fn fallback_inventory() -> Vec<RawStation> {
    FALLBACK_STATIONS
        .iter()
        .map(|&(network, station, latitude, longitude, elevation_m)| RawStation {
            network: network.to_string(),
            station: station.to_string(),
            latitude,
            longitude,
            elevation_m,
            start_date: None,
            channels: ["BHZ", "BHN", "BHE"]
                .iter()
                .map(|code| RawChannel {
                    code: code.to_string(),
                    location: "00".into(),
                    sample_rate: Some(40.0),
                })
                .collect(),
        })
        .collect()
}

/// Static stations inside `[min_km, max_km]`, in priority order.
pub fn fallback_candidates(
    event: &EarthquakeEvent,
    model: &TravelTimeModel,
    min_distance_km: f64,
    max_distance_km: f64,
    log: &LogManager,
) -> Vec<CandidateStation> {
    build_candidates(
        fallback_inventory(),
        event,
        model,
        min_distance_km,
        max_distance_km,
        StationOrigin::Fallback,
        log,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event_in_central_europe() -> EarthquakeEvent {
        EarthquakeEvent::new(
            "eu",
            Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap(),
            45.0,
            10.0,
            10.0,
            5.5,
        )
        .unwrap()
    }

    #[test]
    fn fallback_list_is_filtered_by_annulus() {
        let model = TravelTimeModel::iasp91();
        let log = LogManager::new("test");
        let stations =
            fallback_candidates(&event_in_central_europe(), &model, 200.0, 1500.0, &log);
        assert!(!stations.is_empty());
        assert!(stations
            .iter()
            .all(|s| s.distance_km() >= 200.0 && s.distance_km() <= 1500.0));
        assert!(stations.iter().all(|s| s.origin() == StationOrigin::Fallback));
        assert!(stations.iter().any(|s| s.id() == "II.BFO"));
    }

    #[test]
    fn empty_annulus_gives_no_stations() {
        let model = TravelTimeModel::iasp91();
        let log = LogManager::new("test");
        let stations = fallback_candidates(&event_in_central_europe(), &model, 10.0, 50.0, &log);
        assert!(stations.is_empty());
    }
}
