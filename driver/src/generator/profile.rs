use anyhow::{ensure, Context};
use chrono::{TimeZone, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use seiscore::geodesy::km_to_degrees;
use seiscore::records::waveform::{POST_SURFACE_S, PRE_EVENT_S};
use seiscore::records::{
    CandidateStation, Component, ComponentTrace, EarthquakeEvent, StationOrigin, StationSite,
    WaveformBundle,
};
use seiscore::TravelTimeModel;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Counts per millimetre used for the synthetic raw channel.
const SYNTHETIC_GAIN: f64 = 1.0e6;
/// Gaussian width of the surface-wave packet.
const PACKET_SIGMA_S: f64 = 60.0;
/// Packet centre after the surface arrival.
const PACKET_DELAY_S: f64 = 200.0;

/// Configuration for a synthetic three-component recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub distance_km: f64,
    pub depth_km: f64,
    /// Peak vertical surface-wave displacement.
    pub amplitude_um: f64,
    pub period_s: f64,
    pub sampling_rate: f64,
    /// Half-width of the uniform noise added to every component.
    pub noise_um: f64,
    /// Horizontal amplitude relative to the vertical.
    pub horizontal_ratio: f64,
    pub seed: u64,
    pub network: String,
    pub station: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            distance_km: 2_000.0,
            depth_km: 10.0,
            amplitude_um: 1_000.0,
            period_s: 20.0,
            sampling_rate: 10.0,
            noise_um: 5.0,
            horizontal_ratio: 0.5,
            seed: 0,
            network: "XX".into(),
            station: "SYN".into(),
        }
    }
}

/// Event, station and recording generated together.
pub struct SyntheticScenario {
    pub event: EarthquakeEvent,
    pub station: CandidateStation,
    pub bundle: WaveformBundle,
}

fn packet(t: f64, onset: f64, centre: f64, sigma: f64, period: f64) -> f64 {
    let envelope = (-0.5 * ((t - centre) / sigma).powi(2)).exp();
    envelope * (2.0 * PI * (t - onset) / period).sin()
}

pub fn build_scenario(
    config: &GeneratorConfig,
    model: &TravelTimeModel,
) -> anyhow::Result<SyntheticScenario> {
    ensure!(
        config.distance_km > 0.0 && config.distance_km < 19_000.0,
        "synthetic distance {} km must be within (0, 19000)",
        config.distance_km
    );
    ensure!(config.sampling_rate > 0.0, "sampling rate must be positive");
    ensure!(config.period_s > 0.0, "period must be positive");

    let origin = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .context("building synthetic origin time")?;
    let event = EarthquakeEvent::new("synthetic", origin, 0.0, 0.0, config.depth_km, 0.0)
        .context("building synthetic event")?
        .with_description("Ms", "synthetic scenario");
    let site = StationSite {
        network: config.network.clone(),
        station: config.station.clone(),
        latitude: 0.0,
        longitude: km_to_degrees(config.distance_km),
        elevation_m: 0.0,
        start_date: None,
        channel_family: "BH".into(),
        sampling_rate: config.sampling_rate,
    };
    let station = CandidateStation::derive(site, &event, model, StationOrigin::Catalog)
        .context("deriving synthetic station")?;

    let arrivals = *station.arrivals();
    let surface_centre = arrivals.surface_s + PACKET_DELAY_S;
    let end_s = arrivals.surface_s + POST_SURFACE_S + PRE_EVENT_S;
    let count = ((end_s + PRE_EVENT_S) * config.sampling_rate).ceil() as usize;
    let amplitude_mm = config.amplitude_um / 1000.0;
    let noise_mm = config.noise_um / 1000.0;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut bundle = WaveformBundle::new(config.network.clone(), config.station.clone());
    for component in Component::ALL {
        let (scale, p_scale) = match component {
            Component::Vertical => (1.0, 0.05),
            _ => (config.horizontal_ratio, 0.02),
        };
        let displacement: Vec<f64> = (0..count)
            .map(|i| {
                let t = -PRE_EVENT_S + i as f64 / config.sampling_rate;
                let surface = scale
                    * packet(t, arrivals.surface_s, surface_centre, PACKET_SIGMA_S, config.period_s);
                let p = p_scale * packet(t, arrivals.p_s, arrivals.p_s + 3.0, 3.0, 1.0);
                let jitter = if noise_mm > 0.0 {
                    rng.gen_range(-noise_mm..noise_mm)
                } else {
                    0.0
                };
                amplitude_mm * (surface + p) + jitter
            })
            .collect();
        let raw = displacement.iter().map(|v| v * SYNTHETIC_GAIN).collect();
        let trace = ComponentTrace::regular(
            component,
            raw,
            Some(displacement),
            config.sampling_rate,
            -PRE_EVENT_S,
        )
        .with_context(|| format!("building synthetic {:?} trace", component))?;
        bundle = bundle.with_component(component, trace);
    }

    Ok(SyntheticScenario {
        event,
        station,
        bundle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_covers_the_surface_window() {
        let model = TravelTimeModel::iasp91();
        let scenario = build_scenario(&GeneratorConfig::default(), &model).unwrap();
        let vertical = scenario.bundle.component(Component::Vertical).unwrap();
        let last = *vertical.time_axis().last().unwrap();
        assert!(last >= scenario.station.arrivals().surface_s + POST_SURFACE_S);
        assert_eq!(vertical.time_axis()[0], -PRE_EVENT_S);
        assert!(vertical.is_calibrated());
        assert_eq!(scenario.bundle.components().count(), 3);
    }

    #[test]
    fn same_seed_repeats_the_noise() {
        let model = TravelTimeModel::iasp91();
        let config = GeneratorConfig {
            seed: 13,
            distance_km: 800.0,
            ..Default::default()
        };
        let a = build_scenario(&config, &model).unwrap();
        let b = build_scenario(&config, &model).unwrap();
        assert_eq!(a.bundle, b.bundle);
        assert!((a.station.distance_km() - 800.0).abs() < 10.0);
    }

    #[test]
    fn distance_out_of_range_is_rejected() {
        let model = TravelTimeModel::iasp91();
        let config = GeneratorConfig {
            distance_km: 0.0,
            ..Default::default()
        };
        assert!(build_scenario(&config, &model).is_err());
    }
}
