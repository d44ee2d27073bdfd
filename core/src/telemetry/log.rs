use log::{debug, info, warn};

/// Scoped logger for one subsystem; every line is prefixed with the scope.
#[derive(Debug, Clone)]
pub struct LogManager {
    scope: &'static str,
}

impl LogManager {
    pub fn new(scope: &'static str) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.scope, message);
    }

    /// Degraded path: clamps, fallbacks, failed probes.
    pub fn degraded(&self, message: &str) {
        warn!("[{}] {}", self.scope, message);
    }

    pub fn detail(&self, message: &str) {
        debug!("[{}] {}", self.scope, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("seiscore")
    }
}
