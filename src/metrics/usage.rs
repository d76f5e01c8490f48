//! Usage records for billing, and the store they are written to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// One billed inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub user_id: String,
    pub model: String,
    pub backend: String,
    pub scenario: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn model_key(&self) -> String {
        format!("{}:{}", self.backend, self.model)
    }
}

#[derive(Debug, Error)]
pub enum UsageStoreError {
    #[error("Usage record {0} not found")]
    NotFound(Uuid),

    #[error("Usage store failure: {0}")]
    Backend(String),
}

/// Query over stored usage. Unset fields match everything; the date range is
/// inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageFilter {
    pub user_id: Option<String>,
    pub model: Option<String>,
    pub backend: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl UsageFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn matches(&self, record: &UsageRecord) -> bool {
        self.user_id.as_ref().map_or(true, |u| *u == record.user_id)
            && self.model.as_ref().map_or(true, |m| *m == record.model)
            && self.backend.as_ref().map_or(true, |b| *b == record.backend)
            && self.from.map_or(true, |from| record.timestamp >= from)
            && self.to.map_or(true, |to| record.timestamp <= to)
    }
}

/// Persistence for usage records. The storage technology is up to the
/// implementor.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn create(&self, record: UsageRecord) -> Result<(), UsageStoreError>;

    async fn update(&self, record: UsageRecord) -> Result<(), UsageStoreError>;

    /// Matching records, oldest first.
    async fn find(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, UsageStoreError>;
}

/// Process-local store used by the CLI and tests.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    records: RwLock<Vec<UsageRecord>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn create(&self, record: UsageRecord) -> Result<(), UsageStoreError> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    async fn update(&self, record: UsageRecord) -> Result<(), UsageStoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let existing = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or(UsageStoreError::NotFound(record.id))?;
        *existing = record;
        Ok(())
    }

    async fn find(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, UsageStoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<UsageRecord> =
            records.iter().filter(|r| filter.matches(r)).cloned().collect();
        found.sort_by_key(|r| r.timestamp);
        Ok(found)
    }
}

/// Totals for one model inside a [`UsageReport`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub calls: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

/// Aggregated view over a set of usage records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub calls: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub by_model: BTreeMap<String, ModelUsage>,
}

impl UsageReport {
    pub fn from_records(records: &[UsageRecord]) -> Self {
        let mut report = Self::default();
        for record in records {
            report.calls += 1;
            if record.success {
                report.successes += 1;
            }
            report.input_tokens += record.input_tokens as u64;
            report.output_tokens += record.output_tokens as u64;
            report.total_tokens += record.total_tokens as u64;
            report.total_cost_usd += record.cost_usd;

            let model = report.by_model.entry(record.model_key()).or_default();
            model.calls += 1;
            model.total_tokens += record.total_tokens as u64;
            model.cost_usd += record.cost_usd;
        }
        if report.calls > 0 {
            report.success_rate = report.successes as f64 / report.calls as f64;
        }
        report
    }

    /// Run `filter` against `store` and aggregate the result.
    pub async fn generate(
        store: &dyn UsageStore,
        filter: &UsageFilter,
    ) -> Result<Self, UsageStoreError> {
        let records = store.find(filter).await?;
        Ok(Self::from_records(&records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(user: &str, model: &str, tokens: u32, cost: f64, at: DateTime<Utc>) -> UsageRecord {
        UsageRecord {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            model: model.to_string(),
            backend: "openai".to_string(),
            scenario: "general".to_string(),
            input_tokens: tokens / 2,
            output_tokens: tokens - tokens / 2,
            total_tokens: tokens,
            cost_usd: cost,
            latency_ms: 120,
            success: true,
            error_code: None,
            timestamp: at,
        }
    }

    #[tokio::test]
    async fn test_find_by_user_and_range() {
        let store = InMemoryUsageStore::new();
        let now = Utc::now();
        store
            .create(record("alice", "gpt-4", 100, 0.01, now - Duration::days(3)))
            .await
            .unwrap();
        store
            .create(record("alice", "gpt-4", 200, 0.02, now))
            .await
            .unwrap();
        store
            .create(record("bob", "gpt-4", 300, 0.03, now))
            .await
            .unwrap();

        let filter = UsageFilter::for_user("alice").between(now - Duration::days(1), now);
        let found = store.find(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].total_tokens, 200);

        let all_alice = store.find(&UsageFilter::for_user("alice")).await.unwrap();
        assert_eq!(all_alice.len(), 2);
        assert!(all_alice[0].timestamp < all_alice[1].timestamp);
    }

    #[tokio::test]
    async fn test_update_replaces_record() {
        let store = InMemoryUsageStore::new();
        let mut r = record("alice", "gpt-4", 100, 0.01, Utc::now());
        store.create(r.clone()).await.unwrap();
        r.cost_usd = 0.5;
        store.update(r.clone()).await.unwrap();
        let found = store.find(&UsageFilter::default()).await.unwrap();
        assert_eq!(found, vec![r]);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = InMemoryUsageStore::new();
        let r = record("alice", "gpt-4", 1, 0.0, Utc::now());
        assert!(matches!(
            store.update(r).await,
            Err(UsageStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_report_aggregates_totals() {
        let store = InMemoryUsageStore::new();
        let now = Utc::now();
        store.create(record("a", "gpt-4", 100, 0.25, now)).await.unwrap();
        store.create(record("b", "gpt-4", 50, 0.25, now)).await.unwrap();
        store
            .create(record("a", "gpt-3.5-turbo", 10, 0.5, now))
            .await
            .unwrap();

        let report = UsageReport::generate(&store, &UsageFilter::default())
            .await
            .unwrap();
        assert_eq!(report.calls, 3);
        assert_eq!(report.total_tokens, 160);
        assert_eq!(report.total_cost_usd, 1.0);
        assert_eq!(report.success_rate, 1.0);
        assert_eq!(report.by_model["openai:gpt-4"].calls, 2);
        assert_eq!(report.by_model["openai:gpt-3.5-turbo"].total_tokens, 10);
    }

    #[test]
    fn test_empty_report() {
        let report = UsageReport::from_records(&[]);
        assert_eq!(report.calls, 0);
        assert_eq!(report.success_rate, 0.0);
    }
}
