use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use fdsn::{EventQuery, FdsnClient};
use generator::profile::{build_scenario, GeneratorConfig};
use seiscore::geodesy::TravelTimeTable;
use seiscore::processing::BandPreset;
use seiscore::records::EarthquakeEvent;
use seiscore::{DiscoveryOutcome, StationDiscovery, TravelTimeModel};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use workflow::config::WorkflowConfig;
use workflow::runner::{Runner, WorkflowResult};

mod fdsn;
mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Seismic station discovery and Ms analysis driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long, global = true)]
    workflow: Option<PathBuf>,
    /// Travel-time table (JSON) replacing the built-in IASP91 surface table
    #[arg(long, global = true)]
    travel_times: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List recent large earthquakes from the FDSN event service
    Events {
        /// Look back this many days
        #[arg(long, default_value_t = EventQuery::DEFAULT_DAYS)]
        days: i64,
        /// Whole calendar years instead of a look-back, e.g. 2020-2021
        #[arg(long, value_parser = parse_year_range, conflicts_with = "days")]
        years: Option<(i32, i32)>,
        #[arg(long, default_value_t = 6.0)]
        min_magnitude: f64,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Find and verify stations around an earthquake
    Discover {
        /// Origin time, RFC 3339
        #[arg(long, required_unless_present = "latest")]
        time: Option<DateTime<Utc>>,
        #[arg(long, required_unless_present = "latest")]
        lat: Option<f64>,
        #[arg(long, required_unless_present = "latest")]
        lon: Option<f64>,
        /// Use the newest M6.5+ event of the last 180 days instead of --time/--lat/--lon
        #[arg(long, default_value_t = false)]
        latest: bool,
        #[arg(long, default_value_t = 10.0)]
        depth: f64,
        #[arg(long, default_value_t = 0.0)]
        magnitude: f64,
        #[arg(long, default_value = "manual")]
        id: String,
        #[arg(long, default_value_t = 500.0)]
        min_km: f64,
        #[arg(long, default_value_t = 3000.0)]
        max_km: f64,
        #[arg(long, default_value_t = 10)]
        target: usize,
    },
    /// Generate a synthetic recording and run the processing chain on it
    Synthetic {
        #[arg(long, default_value_t = 2000.0)]
        distance_km: f64,
        #[arg(long, default_value_t = 10.0)]
        depth_km: f64,
        #[arg(long, default_value_t = 1000.0)]
        amplitude_um: f64,
        #[arg(long, default_value_t = 5.0)]
        noise_um: f64,
        #[arg(long, default_value_t = 10.0)]
        sampling_rate: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = BandPreset::Surface)]
        band: BandPreset,
        /// Append a one-line summary to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn parse_year_range(text: &str) -> Result<(i32, i32), String> {
    let (first, last) = text
        .split_once('-')
        .ok_or_else(|| format!("expected FIRST-LAST, got '{}'", text))?;
    let first = first.trim().parse::<i32>().map_err(|e| e.to_string())?;
    let last = last.trim().parse::<i32>().map_err(|e| e.to_string())?;
    if first > last {
        return Err(format!("year range {}-{} is inverted", first, last));
    }
    Ok((first, last))
}

fn load_config(workflow: Option<&Path>) -> anyhow::Result<WorkflowConfig> {
    match workflow {
        Some(path) => WorkflowConfig::load(path),
        None => Ok(WorkflowConfig::default()),
    }
}

fn print_events(events: &[EarthquakeEvent]) {
    for event in events {
        println!(
            "{:<12} {}  M{:.1} {:<4} {:>6.1} km  {:>8.3} {:>9.3}  {}",
            event.event_id(),
            event.origin_time().format("%Y-%m-%d %H:%M:%S"),
            event.magnitude(),
            event.magnitude_type(),
            event.depth_km(),
            event.latitude(),
            event.longitude(),
            event.location()
        );
    }
}

fn load_model(path: Option<&Path>) -> anyhow::Result<TravelTimeModel> {
    let Some(path) = path else {
        return Ok(TravelTimeModel::iasp91());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading travel-time table {}", path.display()))?;
    let table = TravelTimeTable::from_json(&text)
        .with_context(|| format!("parsing travel-time table {}", path.display()))?;
    TravelTimeModel::from_table(&table).context("building travel-time model")
}

fn print_outcome(outcome: &DiscoveryOutcome) {
    println!(
        "{} stations ({:?} list), probes submitted {} verified {} unavailable {} abandoned {}",
        outcome.stations.len(),
        outcome.source,
        outcome.metrics.submitted,
        outcome.metrics.verified,
        outcome.metrics.unavailable,
        outcome.metrics.abandoned
    );
    for station in &outcome.stations {
        let arrivals = station.arrivals();
        println!(
            "{:<10} {:>7.0} km {:>5.0} deg  {}@{:.0}Hz  P {:>6.1}s S {:>6.1}s R {:>6.1}s  {:?}",
            station.id(),
            station.distance_km(),
            station.azimuth_deg(),
            station.channel_family(),
            station.sampling_rate(),
            arrivals.p_s,
            arrivals.s_s,
            arrivals.surface_s,
            station.verification()
        );
    }
}

fn print_result(result: &WorkflowResult) {
    println!("{} ({} band)", result.station, result.band);
    for component in &result.components {
        println!(
            "  {:?}: {} spikes={:?} snr={:?}",
            component.component, component.status, component.spike_count, component.snr
        );
        if let Some(err) = &component.spike_error {
            println!("    spike cleaning skipped: {}", err);
        }
    }
    println!("{}", result.magnitude.explanation);
    match &result.spectral_peak {
        Some(peak) => println!(
            "Spectral peak {:.1} s ({:?}, in 15-25 s band: {})",
            peak.period_s, peak.quality, peak.in_target_band
        ),
        None => println!("Spectral peak: none in 5-100 s"),
    }
    println!(
        "Timing {}: P {:.1} s vs {:.1} s expected (threshold {:.1} s)",
        if result.timing.is_valid { "ok" } else { "suspect" },
        result.timing.observed_p_s,
        result.timing.expected_p_s,
        result.timing.threshold_s
    );
}

fn append_report(path: &Path, result: &WorkflowResult) -> anyhow::Result<()> {
    let report = format!(
        "station={} band={} ms={:.1} dominant={:?} distance_km={:.0} peak_period={:?} timing_valid={}\n",
        result.station,
        result.band,
        result.magnitude.magnitude,
        result.magnitude.dominant,
        result.magnitude.distance_km,
        result.spectral_peak.map(|p| p.period_s),
        result.timing.is_valid
    );
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(report.as_bytes())?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let model = load_model(args.travel_times.as_deref())?;

    match args.command {
        Command::Events {
            days,
            years,
            min_magnitude,
            limit,
        } => {
            let config = load_config(args.workflow.as_deref())?;
            let mut query = match years {
                Some((first, last)) => EventQuery::years(first, last)
                    .with_context(|| format!("building year range {}-{}", first, last))?,
                None => EventQuery::recent(Utc::now(), days),
            };
            query.min_magnitude = min_magnitude;
            query.limit = limit;
            let client = FdsnClient::new(config.fdsn)?;
            let runtime = TokioBuilder::new_current_thread()
                .enable_all()
                .build()
                .context("creating runtime for event search")?;
            let events = runtime
                .block_on(client.get_events(&query))
                .context("querying event service")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                print_events(&events);
            }
        }
        Command::Discover {
            time,
            lat,
            lon,
            latest,
            depth,
            magnitude,
            id,
            min_km,
            max_km,
            target,
        } => {
            let config = match &args.workflow {
                Some(path) => WorkflowConfig::load(path)?,
                None => WorkflowConfig::from_args(min_km, max_km, target, BandPreset::Surface),
            };
            let client = Arc::new(FdsnClient::new(config.fdsn.clone())?);
            let runtime = TokioBuilder::new_multi_thread()
                .enable_all()
                .build()
                .context("creating runtime for discovery")?;
            let event = if latest {
                let query = EventQuery {
                    min_magnitude: 6.5,
                    limit: 20,
                    ..EventQuery::recent(Utc::now(), EventQuery::DEFAULT_DAYS)
                };
                let events = runtime
                    .block_on(client.get_events(&query))
                    .context("querying event service")?;
                events
                    .into_iter()
                    .next()
                    .context("no M6.5+ event in the last 180 days")?
            } else {
                match (time, lat, lon) {
                    (Some(time), Some(lat), Some(lon)) => {
                        EarthquakeEvent::new(id, time, lat, lon, depth, magnitude)
                            .context("validating event parameters")?
                    }
                    _ => anyhow::bail!("--time, --lat and --lon are required without --latest"),
                }
            };
            if latest && !args.json {
                print_events(std::slice::from_ref(&event));
            }
            let discovery = StationDiscovery::new(
                client.clone(),
                client,
                Arc::new(model),
                config.discovery.clone(),
            );
            let runner = Runner::new(config);
            let outcome = runtime.block_on(runner.discover(&discovery, &event));
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }
        Command::Synthetic {
            distance_km,
            depth_km,
            amplitude_um,
            noise_um,
            sampling_rate,
            seed,
            band,
            report,
        } => {
            let mut config = load_config(args.workflow.as_deref())?;
            config.band = band;
            let generator = GeneratorConfig {
                distance_km,
                depth_km,
                amplitude_um,
                noise_um,
                sampling_rate,
                seed,
                ..Default::default()
            };
            let scenario = build_scenario(&generator, &model)?;
            let result = Runner::new(config).execute(
                &scenario.bundle,
                &scenario.station,
                &scenario.event,
            )?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
            if let Some(path) = report {
                append_report(&path, &result)
                    .with_context(|| format!("appending report to {}", path.display()))?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_ranges_parse_in_order() {
        assert_eq!(parse_year_range("2020-2021"), Ok((2020, 2021)));
        assert_eq!(parse_year_range("2023 - 2023"), Ok((2023, 2023)));
        assert!(parse_year_range("2022-2020").is_err());
        assert!(parse_year_range("2022").is_err());
    }

    #[test]
    fn latest_replaces_the_manual_origin() {
        let args = Args::try_parse_from(["seisdriver", "discover", "--latest"]).unwrap();
        assert!(matches!(args.command, Command::Discover { latest: true, time: None, .. }));
        assert!(Args::try_parse_from(["seisdriver", "discover", "--lat", "1"]).is_err());
    }
}
