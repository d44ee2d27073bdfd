use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Counters for one discovery run: catalog attempts and probe outcomes.
pub struct ProbeMetrics {
    inner: Mutex<ProbeCounts>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeCounts {
    pub catalog_attempts: usize,
    pub submitted: usize,
    pub verified: usize,
    pub unavailable: usize,
    /// Probes still outstanding when the run stopped (early stop or budget).
    pub abandoned: usize,
}

impl ProbeMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ProbeCounts::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut ProbeCounts)) {
        if let Ok(mut counts) = self.inner.lock() {
            apply(&mut counts);
        }
    }

    pub fn record_catalog_attempt(&self) {
        self.update(|c| c.catalog_attempts += 1);
    }

    pub fn record_submitted(&self, count: usize) {
        self.update(|c| c.submitted += count);
    }

    pub fn record_verified(&self) {
        self.update(|c| c.verified += 1);
    }

    pub fn record_unavailable(&self) {
        self.update(|c| c.unavailable += 1);
    }

    pub fn record_abandoned(&self, count: usize) {
        self.update(|c| c.abandoned += count);
    }

    pub fn snapshot(&self) -> ProbeCounts {
        self.inner.lock().map(|c| *c).unwrap_or_default()
    }
}

impl Default for ProbeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counts() {
        let metrics = ProbeMetrics::new();
        metrics.record_catalog_attempt();
        metrics.record_submitted(4);
        metrics.record_verified();
        metrics.record_verified();
        metrics.record_unavailable();
        metrics.record_abandoned(1);

        let counts = metrics.snapshot();
        assert_eq!(counts.catalog_attempts, 1);
        assert_eq!(counts.submitted, 4);
        assert_eq!(counts.verified, 2);
        assert_eq!(counts.unavailable, 1);
        assert_eq!(counts.abandoned, 1);
    }
}
