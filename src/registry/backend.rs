use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend health status.
///
/// Determines whether the backend's models are offered to the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    /// Backend answered its last health probe
    Healthy,
    /// Backend failed enough consecutive probes to be taken out of rotation
    Unhealthy,
    /// Health status is unknown (not yet checked)
    Unknown,
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackendStatus::Healthy => "healthy",
            BackendStatus::Unhealthy => "unhealthy",
            BackendStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Mutable per-backend state kept next to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendState {
    pub status: BackendStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            status: BackendStatus::Unknown,
            last_health_check: None,
            last_error: None,
        }
    }
}

/// Read-only snapshot of one backend, for display and gauges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendView {
    pub name: String,
    pub backend_type: String,
    pub status: BackendStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub model_count: usize,
}
