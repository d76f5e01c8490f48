//! Background health checking.
//!
//! Probes every registered backend on an interval, folds the outcomes into
//! per-backend status, and re-lists models from backends that answer.

mod state;

pub use state::{ProbeOutcome, ProbeTracker};

use crate::registry::{BackendStatus, Registry};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// `[health_check]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    /// Seconds between probe rounds
    pub interval_seconds: u64,
    /// Upper bound on a single probe
    pub timeout_seconds: u64,
    /// Consecutive failures before a healthy backend is marked unhealthy
    pub failure_threshold: u32,
    /// Consecutive successes before an unhealthy backend returns
    pub recovery_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 30,
            timeout_seconds: 5,
            failure_threshold: 3,
            recovery_threshold: 2,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

/// Background service that periodically probes backend health.
pub struct HealthChecker {
    registry: Arc<Registry>,
    config: HealthCheckConfig,
    trackers: DashMap<String, ProbeTracker>,
}

impl HealthChecker {
    pub fn new(registry: Arc<Registry>, config: HealthCheckConfig) -> Self {
        Self {
            registry,
            config,
            trackers: DashMap::new(),
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Probe one backend, bounded by the configured timeout.
    pub async fn probe(&self, name: &str) -> ProbeOutcome {
        let Some(agent) = self.registry.get_agent(name) else {
            return ProbeOutcome::Unhealthy {
                reason: format!("backend not registered: {name}"),
            };
        };

        let start = Instant::now();
        match tokio::time::timeout(self.config.timeout(), agent.health_check()).await {
            Ok(true) => ProbeOutcome::Healthy {
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Ok(false) => ProbeOutcome::Unhealthy {
                reason: "health probe failed".to_string(),
            },
            Err(_) => ProbeOutcome::Unhealthy {
                reason: format!("health probe timed out after {}s", self.config.timeout_seconds),
            },
        }
    }

    /// Fold a probe outcome into the registry.
    ///
    /// Only a healthy outcome re-lists the backend's models.
    pub async fn apply(&self, name: &str, outcome: &ProbeOutcome) {
        let transition = {
            let mut tracker = self.trackers.entry(name.to_string()).or_default();
            tracker.observe(outcome, &self.config)
        };

        if let Some(status) = transition {
            let error = match outcome {
                ProbeOutcome::Unhealthy { reason } => Some(reason.clone()),
                ProbeOutcome::Healthy { .. } => None,
            };
            if let Err(e) = self.registry.update_status(name, status, error) {
                tracing::debug!(backend = %name, error = %e, "Backend vanished during health check");
                return;
            }
        }

        match outcome {
            ProbeOutcome::Healthy { latency_ms } => {
                tracing::trace!(backend = %name, latency_ms, "Backend healthy");
                if let Err(e) = self.registry.refresh_backend(name).await {
                    tracing::debug!(backend = %name, error = %e, "Catalog refresh skipped");
                }
            }
            ProbeOutcome::Unhealthy { reason } => {
                tracing::warn!(backend = %name, reason = %reason, "Backend probe failed");
            }
        }
    }

    /// Probe every registered backend concurrently and apply the results.
    pub async fn check_all(&self) -> Vec<(String, ProbeOutcome)> {
        let names = self.registry.agent_names();
        let outcomes = futures::future::join_all(names.iter().map(|n| self.probe(n))).await;

        let mut results = Vec::with_capacity(names.len());
        for (name, outcome) in names.into_iter().zip(outcomes) {
            self.apply(&name, &outcome).await;
            results.push((name, outcome));
        }
        results
    }

    /// Current tracked status for `name`.
    pub fn status(&self, name: &str) -> BackendStatus {
        self.trackers
            .get(name)
            .map(|t| t.status)
            .unwrap_or(BackendStatus::Unknown)
    }

    /// Run until `cancel_token` fires. The first round runs immediately.
    pub fn start(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            tracing::info!(
                interval_seconds = self.config.interval_seconds,
                "Health checker started"
            );

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::info!("Health checker shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let results = self.check_all().await;
                        let healthy = results.iter().filter(|(_, o)| o.is_healthy()).count();
                        tracing::debug!(
                            backends_checked = results.len(),
                            healthy,
                            "Health check cycle completed"
                        );
                    }
                }
            }
        })
    }
}
