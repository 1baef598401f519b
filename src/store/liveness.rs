use chrono::{DateTime, Utc};
use std::time::Duration;

/// Liveness window used when none is configured.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Decides when a robot has gone quiet for too long.
///
/// The monitor only ever clears `connected`; setting it again is left to a
/// successfully applied packet.
#[derive(Debug, Clone, Copy)]
pub struct LivenessMonitor {
    timeout: Duration,
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_TIMEOUT)
    }
}

impl LivenessMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stale means seen at least once and silent for strictly longer than
    /// the window. A `last_seen` in the future (clock step) is not stale.
    pub fn is_stale(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(seen) = last_seen else {
            return false;
        };
        match (now - seen).to_std() {
            Ok(silence) => silence > self.timeout,
            Err(_) => false,
        }
    }
}
