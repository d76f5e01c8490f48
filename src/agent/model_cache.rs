//! Per-adapter cache of the upstream model list.

use super::{AgentError, ModelDescriptor};
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Default interval between upstream model-list fetches.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(60);

/// Holds the last fetched model list and refetches it once stale.
#[derive(Debug)]
pub struct ModelCache {
    refresh_interval: Duration,
    entry: RwLock<Option<(Instant, Vec<ModelDescriptor>)>>,
}

impl ModelCache {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval,
            entry: RwLock::new(None),
        }
    }

    /// Cached list if it is younger than the refresh interval.
    pub fn fresh(&self) -> Option<Vec<ModelDescriptor>> {
        let entry = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        entry
            .as_ref()
            .filter(|(at, _)| at.elapsed() < self.refresh_interval)
            .map(|(_, models)| models.clone())
    }

    pub fn store(&self, models: Vec<ModelDescriptor>) {
        let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *entry = Some((Instant::now(), models));
    }

    pub fn invalidate(&self) {
        let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *entry = None;
    }

    /// Serve from cache, or run `fetch` and remember its result. A failed fetch
    /// leaves the previous entry untouched.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Vec<ModelDescriptor>, AgentError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ModelDescriptor>, AgentError>>,
    {
        if let Some(models) = self.fresh() {
            return Ok(models);
        }
        let models = fetch().await?;
        self.store(models.clone());
        Ok(models)
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let cache = ModelCache::default();
        let fetches = AtomicU32::new(0);
        for _ in 0..2 {
            let models = cache
                .get_or_fetch(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![ModelDescriptor::new("ollama", "llama3")])
                })
                .await
                .unwrap();
            assert_eq!(models.len(), 1);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_always_refetches() {
        let cache = ModelCache::new(Duration::ZERO);
        cache.store(vec![ModelDescriptor::new("ollama", "old")]);
        let models = cache
            .get_or_fetch(|| async { Ok(vec![ModelDescriptor::new("ollama", "new")]) })
            .await
            .unwrap();
        assert_eq!(models[0].name, "new");
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_entry() {
        let cache = ModelCache::new(Duration::ZERO);
        cache.store(vec![ModelDescriptor::new("ollama", "old")]);
        let result = cache
            .get_or_fetch(|| async { Err(AgentError::Network("down".into())) })
            .await;
        assert!(result.is_err());
        let entry = cache.entry.read().unwrap();
        assert_eq!(entry.as_ref().unwrap().1[0].name, "old");
    }

    #[test]
    fn test_invalidate_clears_entry() {
        let cache = ModelCache::default();
        cache.store(vec![ModelDescriptor::new("ollama", "llama3")]);
        assert!(cache.fresh().is_some());
        cache.invalidate();
        assert!(cache.fresh().is_none());
    }
}
