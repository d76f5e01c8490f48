//! Per-backend probe bookkeeping.

use super::HealthCheckConfig;
use crate::registry::BackendStatus;
use chrono::{DateTime, Utc};

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// `health_check` returned true within the timeout
    Healthy { latency_ms: u64 },
    /// The probe reported false or did not answer in time
    Unhealthy { reason: String },
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy { .. })
    }
}

/// Consecutive-result counters for one backend.
///
/// A backend in `Unknown` flips on its first probe. After that it only flips
/// once a streak reaches the configured threshold, so a single dropped probe
/// does not take a backend out of rotation.
#[derive(Debug, Clone)]
pub struct ProbeTracker {
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_probe: Option<DateTime<Utc>>,
    pub status: BackendStatus,
}

impl Default for ProbeTracker {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_probe: None,
            status: BackendStatus::Unknown,
        }
    }
}

impl ProbeTracker {
    /// Fold in a probe outcome. Returns the new status when it changes.
    pub fn observe(
        &mut self,
        outcome: &ProbeOutcome,
        config: &HealthCheckConfig,
    ) -> Option<BackendStatus> {
        self.last_probe = Some(Utc::now());
        let next = if outcome.is_healthy() {
            self.consecutive_failures = 0;
            self.consecutive_successes += 1;
            let recovered = self.status == BackendStatus::Unhealthy
                && self.consecutive_successes >= config.recovery_threshold;
            (self.status == BackendStatus::Unknown || recovered).then_some(BackendStatus::Healthy)
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures += 1;
            let tripped = self.status == BackendStatus::Healthy
                && self.consecutive_failures >= config.failure_threshold;
            (self.status == BackendStatus::Unknown || tripped).then_some(BackendStatus::Unhealthy)
        };
        if let Some(status) = next {
            self.status = status;
        }
        next
    }
}
