//! Running per-model performance aggregates.
//!
//! Every gateway call, success or failure, lands here. Aggregates use an
//! online mean so no history is needed for the headline numbers; a capped
//! window of raw samples per model backs date-range queries.

use crate::agent::ModelDescriptor;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Raw samples retained per model for [`PerformanceRecorder::metrics_between`].
pub const DEFAULT_SAMPLE_CAPACITY: usize = 1000;

/// Aggregated call statistics for one `backend:model`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub model_key: String,
    pub backend: String,
    pub model: String,
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl PerformanceMetrics {
    pub fn new(backend: &str, model: &str) -> Self {
        Self {
            model_key: format!("{}:{}", backend, model),
            backend: backend.to_string(),
            model: model.to_string(),
            total_calls: 0,
            successes: 0,
            failures: 0,
            avg_latency_ms: 0.0,
            min_latency_ms: 0.0,
            max_latency_ms: 0.0,
            success_rate: 0.0,
            failure_rate: 0.0,
            last_updated: Utc::now(),
        }
    }

    /// Fold one observation into the aggregate.
    pub fn observe(&mut self, latency_ms: f64, success: bool, at: DateTime<Utc>) {
        self.total_calls += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }

        if self.total_calls == 1 {
            self.min_latency_ms = latency_ms;
            self.max_latency_ms = latency_ms;
            self.avg_latency_ms = latency_ms;
        } else {
            self.min_latency_ms = self.min_latency_ms.min(latency_ms);
            self.max_latency_ms = self.max_latency_ms.max(latency_ms);
            self.avg_latency_ms += (latency_ms - self.avg_latency_ms) / self.total_calls as f64;
        }

        self.success_rate = self.successes as f64 / self.total_calls as f64;
        self.failure_rate = self.failures as f64 / self.total_calls as f64;
        self.last_updated = at;
    }
}

#[derive(Debug, Clone, Copy)]
struct CallSample {
    at: DateTime<Utc>,
    latency_ms: f64,
    success: bool,
}

/// Concurrent store of [`PerformanceMetrics`] keyed by `backend:model`.
#[derive(Debug)]
pub struct PerformanceRecorder {
    stats: DashMap<String, PerformanceMetrics>,
    samples: DashMap<String, VecDeque<CallSample>>,
    sample_capacity: usize,
}

impl PerformanceRecorder {
    pub fn new(sample_capacity: usize) -> Self {
        Self {
            stats: DashMap::new(),
            samples: DashMap::new(),
            sample_capacity: sample_capacity.max(1),
        }
    }

    pub fn record(&self, backend: &str, model: &str, latency_ms: f64, success: bool) {
        self.record_at(backend, model, latency_ms, success, Utc::now());
    }

    /// Record with an explicit timestamp.
    pub fn record_at(
        &self,
        backend: &str,
        model: &str,
        latency_ms: f64,
        success: bool,
        at: DateTime<Utc>,
    ) {
        let key = format!("{}:{}", backend, model);

        self.stats
            .entry(key.clone())
            .or_insert_with(|| PerformanceMetrics::new(backend, model))
            .observe(latency_ms, success, at);

        let mut window = self.samples.entry(key).or_default();
        if window.len() >= self.sample_capacity {
            window.pop_front();
        }
        window.push_back(CallSample {
            at,
            latency_ms,
            success,
        });
    }

    pub fn get(&self, model_key: &str) -> Option<PerformanceMetrics> {
        self.stats.get(model_key).map(|m| m.clone())
    }

    /// All aggregates ordered by model key.
    pub fn all(&self) -> Vec<PerformanceMetrics> {
        let mut all: Vec<PerformanceMetrics> = self.stats.iter().map(|e| e.clone()).collect();
        all.sort_by(|a, b| a.model_key.cmp(&b.model_key));
        all
    }

    /// Aggregate recomputed from retained samples within `[from, to]`.
    ///
    /// Only the newest samples are retained, so ranges reaching further back
    /// than the window cover fewer calls than were actually made.
    pub fn metrics_between(
        &self,
        model_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<PerformanceMetrics> {
        let window = self.samples.get(model_key)?;
        let (backend, model) = model_key.split_once(':').unwrap_or(("", model_key));
        let mut metrics = PerformanceMetrics::new(backend, model);
        for sample in window.iter().filter(|s| s.at >= from && s.at <= to) {
            metrics.observe(sample.latency_ms, sample.success, sample.at);
        }
        (metrics.total_calls > 0).then_some(metrics)
    }

    /// Copy observed latency and success rate onto a catalog descriptor.
    /// Models with no observations keep their defaults.
    pub fn overlay(&self, descriptor: &mut ModelDescriptor) {
        if let Some(stats) = self.stats.get(&descriptor.key()) {
            descriptor.avg_latency_ms = stats.avg_latency_ms;
            descriptor.min_latency_ms = stats.min_latency_ms;
            descriptor.max_latency_ms = stats.max_latency_ms;
            descriptor.success_rate = stats.success_rate;
        }
    }

    pub fn reset(&self) {
        self.stats.clear();
        self.samples.clear();
    }
}

impl Default for PerformanceRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY)
    }
}
