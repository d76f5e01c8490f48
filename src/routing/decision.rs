//! Selection decision records.

use super::SelectionStrategy;
use crate::agent::ModelDescriptor;
use crate::history::RingBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of decisions retained by [`RingDecisionLog`].
pub const DEFAULT_DECISION_CAPACITY: usize = 1000;

/// Optional caller context attached to a decision. Observability only; it
/// never influences which model is picked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionContext {
    pub agent_type: Option<String>,
    pub step_id: Option<String>,
    pub user_id: Option<String>,
}

impl SelectionContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }
}

/// One selector outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionDecision {
    pub timestamp: DateTime<Utc>,
    pub scenario: String,
    pub model: String,
    pub backend: String,
    pub strategy: SelectionStrategy,
    /// Combined per-token cost at decision time
    pub cost: f64,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
    /// No candidate was available; the first listed model was used
    pub degraded: bool,
    pub candidates: usize,
    #[serde(default)]
    pub context: SelectionContext,
}

impl SelectionDecision {
    pub(crate) fn snapshot(
        scenario: &str,
        strategy: SelectionStrategy,
        chosen: &ModelDescriptor,
        candidates: usize,
        degraded: bool,
        context: SelectionContext,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            scenario: scenario.to_string(),
            model: chosen.name.clone(),
            backend: chosen.backend.clone(),
            strategy,
            cost: chosen.combined_cost(),
            avg_latency_ms: chosen.avg_latency_ms,
            success_rate: chosen.success_rate,
            degraded,
            candidates,
            context,
        }
    }

    pub fn model_key(&self) -> String {
        format!("{}:{}", self.backend, self.model)
    }
}

/// Append-only sink for selection decisions.
pub trait DecisionLog: Send + Sync {
    fn record(&self, decision: SelectionDecision);

    /// Up to `n` decisions, newest first.
    fn recent(&self, n: usize) -> Vec<SelectionDecision>;
}

/// Bounded in-memory decision log; the oldest entry is evicted when full.
#[derive(Debug)]
pub struct RingDecisionLog {
    entries: RingBuffer<SelectionDecision>,
}

impl RingDecisionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RingBuffer::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All retained decisions, oldest first.
    pub fn all(&self) -> Vec<SelectionDecision> {
        self.entries.get_all()
    }
}

impl Default for RingDecisionLog {
    fn default() -> Self {
        Self::new(DEFAULT_DECISION_CAPACITY)
    }
}

impl DecisionLog for RingDecisionLog {
    fn record(&self, decision: SelectionDecision) {
        tracing::debug!(
            scenario = %decision.scenario,
            model = %decision.model_key(),
            strategy = %decision.strategy,
            degraded = decision.degraded,
            candidates = decision.candidates,
            "Selection decision"
        );
        self.entries.push(decision);
    }

    fn recent(&self, n: usize) -> Vec<SelectionDecision> {
        self.entries.recent(n)
    }
}
