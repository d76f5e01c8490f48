//! Step-output cache.

use super::CollaboratorError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Cache key for a step's output within a session.
pub fn cache_key(session_id: &str, step_id: &str) -> String {
    format!("workflow:cache:{session_id}:{step_id}")
}

/// String key-value store with per-entry expiry.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CollaboratorError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CollaboratorError>;
}

/// Process-local cache. Expired entries are dropped when read.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (Instant, String)>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries stored, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CollaboratorError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (expires_at, value) = entry.value();
            if *expires_at > now {
                return Ok(Some(value.clone()));
            }
        }
        self.entries.remove_if(key, |_, (expires_at, _)| *expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CollaboratorError> {
        self.entries
            .insert(key.to_string(), (Instant::now() + ttl, value));
        Ok(())
    }
}
