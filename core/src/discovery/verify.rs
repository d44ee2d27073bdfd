//! Concurrent data-availability probes with early stop and a soft budget.

use crate::discovery::catalog::{WaveformRequest, WaveformSource};
use crate::telemetry::{LogManager, ProbeMetrics};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Data found on the given channel pattern.
    Verified(String),
    Unavailable,
}

/// Station to probe; `index` points back into the caller's candidate list.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub index: usize,
    pub network: String,
    pub station: String,
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub workers: usize,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub channel_patterns: Vec<String>,
    pub attempt_timeout: Duration,
    pub budget: Duration,
    /// Stop once this many stations are verified.
    pub stop_after_verified: usize,
}

struct LedgerState {
    outcomes: Vec<(usize, ProbeResult)>,
    verified: usize,
    closed: bool,
}

/// Shared record of probe outcomes. Appending, counting verified stations
/// and deciding the early stop happen under one lock, so nothing recorded
/// after the stop is kept.
pub struct VerificationLedger {
    stop_after_verified: usize,
    state: Mutex<LedgerState>,
}

impl VerificationLedger {
    pub fn new(stop_after_verified: usize) -> Self {
        Self {
            stop_after_verified: stop_after_verified.max(1),
            state: Mutex::new(LedgerState {
                outcomes: Vec::new(),
                verified: 0,
                closed: false,
            }),
        }
    }

    /// Records an outcome; returns `true` once the early-stop threshold is met.
    pub fn record(&self, index: usize, result: ProbeResult) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return true;
        };
        if state.closed {
            return true;
        }
        if matches!(result, ProbeResult::Verified(_)) {
            state.verified += 1;
        }
        state.outcomes.push((index, result));
        if state.verified >= self.stop_after_verified {
            state.closed = true;
        }
        state.closed
    }

    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(true)
    }

    pub fn verified(&self) -> usize {
        self.state.lock().map(|s| s.verified).unwrap_or(0)
    }

    pub fn outcomes(&self) -> Vec<(usize, ProbeResult)> {
        self.state
            .lock()
            .map(|s| s.outcomes.clone())
            .unwrap_or_default()
    }
}

/// Tries each channel pattern once, each attempt under its own timeout.
async fn probe_station(
    source: Arc<dyn WaveformSource>,
    target: &ProbeTarget,
    settings: &ProbeSettings,
    log: &LogManager,
) -> ProbeResult {
    for pattern in &settings.channel_patterns {
        let request = WaveformRequest {
            network: target.network.clone(),
            station: target.station.clone(),
            location: "*".into(),
            channel: pattern.clone(),
            start: settings.window_start,
            end: settings.window_end,
        };
        match tokio::time::timeout(settings.attempt_timeout, source.get_waveforms(&request)).await
        {
            Ok(Ok(traces)) if !traces.is_empty() => {
                return ProbeResult::Verified(pattern.clone());
            }
            Ok(Ok(_)) => log.detail(&format!(
                "{}.{} {}: no data",
                target.network, target.station, pattern
            )),
            Ok(Err(err)) => log.detail(&format!(
                "{}.{} {}: {}",
                target.network, target.station, pattern, err
            )),
            Err(_) => log.detail(&format!(
                "{}.{} {}: probe timed out",
                target.network, target.station, pattern
            )),
        }
    }
    ProbeResult::Unavailable
}

/// Probes all targets on a bounded pool and returns the recorded outcomes.
///
/// Stops early when `stop_after_verified` stations are verified, or when the
/// budget runs out; outstanding probes are aborted and their stations get no
/// outcome. The verified and unavailable counters in `metrics` follow the
/// returned outcomes; every other submitted station counts as abandoned.
pub async fn verify_availability(
    source: Arc<dyn WaveformSource>,
    targets: Vec<ProbeTarget>,
    settings: ProbeSettings,
    metrics: &ProbeMetrics,
    log: &LogManager,
) -> Vec<(usize, ProbeResult)> {
    if targets.is_empty() {
        return Vec::new();
    }
    let ledger = Arc::new(VerificationLedger::new(settings.stop_after_verified));
    let semaphore = Arc::new(Semaphore::new(settings.workers.max(1)));
    let settings = Arc::new(settings);
    let deadline = Instant::now() + settings.budget;
    let submitted = targets.len();

    metrics.record_submitted(submitted);
    let mut tasks = JoinSet::new();
    for target in targets {
        let source = Arc::clone(&source);
        let ledger = Arc::clone(&ledger);
        let semaphore = Arc::clone(&semaphore);
        let settings = Arc::clone(&settings);
        let log = log.clone();
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            if ledger.is_closed() {
                return;
            }
            let result = probe_station(source, &target, &settings, &log).await;
            ledger.record(target.index, result);
        });
    }

    loop {
        if ledger.is_closed() {
            log.record(&format!(
                "early stop after {} verified stations",
                ledger.verified()
            ));
            break;
        }
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok(()))) => {}
            Ok(Some(Err(err))) => log.degraded(&format!("probe task failed: {}", err)),
            Ok(None) => break,
            Err(_) => {
                log.degraded(&format!(
                    "verification budget of {:?} exhausted with {} probes outstanding",
                    settings.budget,
                    tasks.len()
                ));
                break;
            }
        }
    }

    // Late finishers may still be running until their next await point.
    ledger.close();
    tasks.abort_all();
    let outcomes = ledger.outcomes();
    for (_, result) in &outcomes {
        match result {
            ProbeResult::Verified(_) => metrics.record_verified(),
            ProbeResult::Unavailable => metrics.record_unavailable(),
        }
    }
    let abandoned = submitted - outcomes.len();
    if abandoned > 0 {
        metrics.record_abandoned(abandoned);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::catalog::RawTrace;
    use crate::prelude::SourceError;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Stations in `ready` answer at once; `empty` answer with no data; all
    /// others hang until aborted.
    struct ScriptedSource {
        ready: HashSet<String>,
        empty: HashSet<String>,
        bh_only: HashSet<String>,
    }

    fn trace(request: &WaveformRequest) -> RawTrace {
        RawTrace {
            network: request.network.clone(),
            station: request.station.clone(),
            location: "00".into(),
            channel: request.channel.replace('?', "Z"),
            start: request.start,
            sampling_rate: 40.0,
            sample_count: 1200,
            samples: Vec::new(),
        }
    }

    #[async_trait]
    impl WaveformSource for ScriptedSource {
        async fn get_waveforms(
            &self,
            request: &WaveformRequest,
        ) -> Result<Vec<RawTrace>, SourceError> {
            let station = &request.station;
            if self.bh_only.contains(station) {
                return if request.channel == "BH?" {
                    Ok(vec![trace(request)])
                } else {
                    Err(SourceError::Malformed("no HH".into()))
                };
            }
            if self.ready.contains(station) {
                return Ok(vec![trace(request)]);
            }
            if self.empty.contains(station) {
                return Ok(Vec::new());
            }
            std::future::pending().await
        }
    }

    fn targets(count: usize) -> Vec<ProbeTarget> {
        (0..count)
            .map(|index| ProbeTarget {
                index,
                network: "XX".into(),
                station: format!("S{}", index),
            })
            .collect()
    }

    fn settings(stop_after_verified: usize, budget: Duration) -> ProbeSettings {
        let start = Utc::now();
        ProbeSettings {
            workers: 64,
            window_start: start,
            window_end: start + chrono::Duration::seconds(30),
            channel_patterns: vec!["HH?".into(), "BH?".into()],
            attempt_timeout: Duration::from_secs(3600),
            budget,
            stop_after_verified,
        }
    }

    fn names(range: std::ops::Range<usize>) -> HashSet<String> {
        range.map(|i| format!("S{}", i)).collect()
    }

    #[tokio::test]
    async fn early_stop_returns_while_other_probes_hang() {
        let source = Arc::new(ScriptedSource {
            ready: names(0..4),
            empty: HashSet::new(),
            bh_only: HashSet::new(),
        });
        let metrics = ProbeMetrics::new();
        let outcomes = tokio::time::timeout(
            Duration::from_secs(10),
            verify_availability(
                source,
                targets(12),
                settings(4, Duration::from_secs(3600)),
                &metrics,
                &LogManager::new("test"),
            ),
        )
        .await
        .expect("verification did not stop early");

        let verified: Vec<usize> = outcomes
            .iter()
            .filter(|(_, r)| matches!(r, ProbeResult::Verified(_)))
            .map(|(i, _)| *i)
            .collect();
        assert_eq!(verified.len(), 4);
        assert!(verified.iter().all(|i| *i < 4));
        assert!(metrics.snapshot().abandoned >= 8);
    }

    #[tokio::test]
    async fn budget_expiry_returns_partial_results() {
        let source = Arc::new(ScriptedSource {
            ready: names(0..1),
            empty: names(1..2),
            bh_only: HashSet::new(),
        });
        let metrics = ProbeMetrics::new();
        let outcomes = verify_availability(
            source,
            targets(5),
            settings(10, Duration::from_millis(200)),
            &metrics,
            &LogManager::new("test"),
        )
        .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.contains(&(0, ProbeResult::Verified("HH?".into()))));
        assert!(outcomes.contains(&(1, ProbeResult::Unavailable)));
        assert_eq!(metrics.snapshot().abandoned, 3);
    }

    #[tokio::test]
    async fn high_rate_failure_falls_back_to_broadband() {
        let source = Arc::new(ScriptedSource {
            ready: HashSet::new(),
            empty: HashSet::new(),
            bh_only: names(0..1),
        });
        let outcomes = verify_availability(
            source,
            targets(1),
            settings(2, Duration::from_secs(5)),
            &ProbeMetrics::new(),
            &LogManager::new("test"),
        )
        .await;
        assert_eq!(outcomes, vec![(0, ProbeResult::Verified("BH?".into()))]);
    }

    #[tokio::test]
    async fn counters_match_the_kept_outcomes() {
        let source = Arc::new(ScriptedSource {
            ready: names(0..10),
            empty: names(10..14),
            bh_only: HashSet::new(),
        });
        let metrics = ProbeMetrics::new();
        let outcomes = verify_availability(
            source,
            targets(20),
            settings(3, Duration::from_secs(5)),
            &metrics,
            &LogManager::new("test"),
        )
        .await;

        let verified = outcomes
            .iter()
            .filter(|(_, r)| matches!(r, ProbeResult::Verified(_)))
            .count();
        let counts = metrics.snapshot();
        assert_eq!(verified, 3);
        assert_eq!(counts.verified, verified);
        assert_eq!(counts.unavailable, outcomes.len() - verified);
        assert_eq!(
            counts.verified + counts.unavailable + counts.abandoned,
            counts.submitted
        );
    }

    #[test]
    fn ledger_discards_results_after_the_stop() {
        let ledger = VerificationLedger::new(2);
        assert!(!ledger.record(0, ProbeResult::Verified("HH?".into())));
        assert!(!ledger.record(1, ProbeResult::Unavailable));
        assert!(ledger.record(2, ProbeResult::Verified("BH?".into())));
        assert!(ledger.record(3, ProbeResult::Verified("BH?".into())));
        assert_eq!(ledger.verified(), 2);
        assert_eq!(ledger.outcomes().len(), 3);
    }
}
