use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use seiscore::processing::magnitude::{surface_wave_window, DominantComponent};
use seiscore::processing::timing::TimingValidation;
use seiscore::processing::{
    calculate_ms_for_bundle, process_waveform, spectral_peak_period, validate_timing,
    ComponentStatus, FilterBand, MagnitudeResult, SpectralPeak, DEFAULT_TARGET_BAND_S,
};
use seiscore::records::{CandidateStation, Component, EarthquakeEvent, WaveformBundle};
use seiscore::{DiscoveryOutcome, StationDiscovery};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ComponentSummary {
    pub component: Component,
    pub status: String,
    pub spike_count: Option<usize>,
    pub spike_error: Option<String>,
    pub snr: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub station: String,
    pub band: String,
    pub components: Vec<ComponentSummary>,
    pub magnitude: MagnitudeResult,
    pub spectral_peak: Option<SpectralPeak>,
    pub timing: TimingValidation,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub async fn discover(
        &self,
        discovery: &StationDiscovery,
        event: &EarthquakeEvent,
    ) -> DiscoveryOutcome {
        discovery
            .discover_stations(
                event,
                self.config.min_distance_km,
                self.config.max_distance_km,
                self.config.target_count,
            )
            .await
    }

    /// Processes one station's recording: per-component cleaning and
    /// filtering, Ms over the surface-wave window, the spectral peak of the
    /// dominant component and the P timing check.
    ///
    /// Ms and the spectral peak read the uncleaned surface-wave window. The
    /// spike cleaner scales its threshold by the MAD of the whole trace, so
    /// on a quiet record the surface-wave packet itself exceeds it; the
    /// per-component spike counts flag records whose peak may be a glitch.
    pub fn execute(
        &self,
        bundle: &WaveformBundle,
        station: &CandidateStation,
        event: &EarthquakeEvent,
    ) -> anyhow::Result<WorkflowResult> {
        let band = FilterBand::from(self.config.band);
        let processed = process_waveform(bundle, &band, &self.config.processing);
        let components = processed
            .components
            .iter()
            .map(|(component, result)| ComponentSummary {
                component: *component,
                status: match &result.status {
                    ComponentStatus::Filtered => "filtered".to_string(),
                    ComponentStatus::PassThrough => "unfiltered".to_string(),
                    ComponentStatus::Failed(err) => format!("failed: {}", err),
                },
                spike_count: result.spike_count,
                spike_error: result.spike_error.as_ref().map(|e| e.to_string()),
                snr: result.noise.map(|n| n.snr),
            })
            .collect();

        let magnitude = calculate_ms_for_bundle(bundle, station, Some(event.depth_km()))
            .with_context(|| format!("computing Ms for {}", station.id()))?;

        let dominant = match magnitude.dominant {
            DominantComponent::Vertical => Component::Vertical,
            DominantComponent::Horizontal
                if magnitude.amplitudes.east_um > magnitude.amplitudes.north_um =>
            {
                Component::East
            }
            DominantComponent::Horizontal => Component::North,
        };
        let spectral_peak = bundle.component(dominant).and_then(|trace| {
            let window = surface_wave_window(trace, station.arrivals().surface_s);
            spectral_peak_period(&window, trace.sampling_rate(), DEFAULT_TARGET_BAND_S)
        });

        Ok(WorkflowResult {
            station: station.id(),
            band: self.config.band.to_string(),
            components,
            magnitude,
            spectral_peak,
            timing: validate_timing(station),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{build_scenario, GeneratorConfig};
    use seiscore::math::StatsHelper;
    use seiscore::processing::spikes::DEFAULT_SPIKE_THRESHOLD;
    use seiscore::processing::{remove_spikes, PeriodQuality};
    use seiscore::records::ComponentTrace;
    use seiscore::TravelTimeModel;

    #[test]
    fn runner_recovers_synthetic_magnitude() {
        let model = TravelTimeModel::iasp91();
        let generator = GeneratorConfig::default();
        let scenario = build_scenario(&generator, &model).unwrap();
        let runner = Runner::new(WorkflowConfig::default());
        let result = runner
            .execute(&scenario.bundle, &scenario.station, &scenario.event)
            .unwrap();

        let expected = (generator.amplitude_um / 20.0).log10()
            + 1.66 * result.magnitude.distance_deg.log10()
            + 3.3;
        assert!(
            (result.magnitude.magnitude - expected).abs() < 0.1,
            "Ms {} expected {}",
            result.magnitude.magnitude,
            expected
        );
        assert_eq!(result.magnitude.dominant, DominantComponent::Vertical);
        let peak = result.spectral_peak.unwrap();
        assert_eq!(peak.quality, PeriodQuality::Optimal);
        assert_eq!(result.components.len(), 3);
        assert!(result.components.iter().all(|c| c.status == "filtered"));
    }

    #[test]
    fn spike_cleaning_would_flatten_the_surface_packet() {
        let model = TravelTimeModel::iasp91();
        let scenario = build_scenario(&GeneratorConfig::default(), &model).unwrap();
        let vertical = scenario.bundle.component(Component::Vertical).unwrap();
        let (cleaned, count) = remove_spikes(vertical.working_samples(), DEFAULT_SPIKE_THRESHOLD);
        assert!(count > 100, "only {} samples flagged", count);

        let arrival = scenario.station.arrivals().surface_s;
        let raw_peak = StatsHelper::peak_abs(&surface_wave_window(vertical, arrival));
        let cleaned_trace = ComponentTrace::new(
            Component::Vertical,
            vertical.raw().to_vec(),
            Some(cleaned),
            vertical.sampling_rate(),
            vertical.time_axis().to_vec(),
        )
        .unwrap();
        let cleaned_peak = StatsHelper::peak_abs(&surface_wave_window(&cleaned_trace, arrival));
        assert!(cleaned_peak < 0.2 * raw_peak);

        let result = Runner::new(WorkflowConfig::default())
            .execute(&scenario.bundle, &scenario.station, &scenario.event)
            .unwrap();
        let vertical_summary = result
            .components
            .iter()
            .find(|c| c.component == Component::Vertical)
            .unwrap();
        assert_eq!(vertical_summary.spike_count, Some(count));
        assert!(result.magnitude.amplitudes.vertical_um > 500.0 * raw_peak);
    }

    #[test]
    fn short_distance_fails_with_context() {
        let model = TravelTimeModel::iasp91();
        let generator = GeneratorConfig {
            distance_km: 120.0,
            ..Default::default()
        };
        let scenario = build_scenario(&generator, &model).unwrap();
        let runner = Runner::new(WorkflowConfig::default());
        let err = runner
            .execute(&scenario.bundle, &scenario.station, &scenario.event)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("computing Ms for XX.SYN"));
    }
}
