//! Backend Registry module.
//!
//! Holds the configured adapters keyed by backend name, per-backend health
//! state, and the shared model catalog snapshot.

mod backend;
mod catalog;
mod error;

pub use backend::*;
pub use catalog::Catalog;
pub use error::*;

use crate::agent::{ModelDescriptor, ModelId, SharedAgent};
use crate::metrics::PerformanceRecorder;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// The Backend Registry stores all configured inference backends.
///
/// Agents and their state live in concurrent maps; the catalog is an
/// immutable [`Catalog`] behind an `RwLock<Arc<_>>`. Refreshes build the new
/// snapshot outside the lock and swap it in, so readers only ever clone an
/// `Arc`.
///
/// # Examples
///
/// ```
/// use meridian::agent::factory::create_agent;
/// use meridian::config::{BackendConfig, BackendType};
/// use meridian::registry::Registry;
/// use std::sync::Arc;
///
/// let config = BackendConfig::new("local", "http://localhost:11434", BackendType::Ollama);
/// let agent = create_agent(&config, Arc::new(reqwest::Client::new()), None).unwrap();
///
/// let registry = Registry::new();
/// registry.add_agent(agent).unwrap();
/// assert_eq!(registry.agent_names(), vec!["local".to_string()]);
/// ```
pub struct Registry {
    agents: DashMap<String, SharedAgent>,
    states: DashMap<String, BackendState>,
    /// Registration order; drives catalog order and therefore tie-breaking.
    order: RwLock<Vec<String>>,
    catalog: RwLock<Arc<Catalog>>,
    performance: Option<Arc<PerformanceRecorder>>,
}

impl Registry {
    /// Create a new empty Registry.
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            states: DashMap::new(),
            order: RwLock::new(Vec::new()),
            catalog: RwLock::new(Arc::new(Catalog::default())),
            performance: None,
        }
    }

    /// Overlay live latency and success statistics onto [`Registry::models`].
    pub fn with_performance(mut self, performance: Arc<PerformanceRecorder>) -> Self {
        self.performance = Some(performance);
        self
    }

    pub fn performance(&self) -> Option<&Arc<PerformanceRecorder>> {
        self.performance.as_ref()
    }

    /// Register an adapter under its own name.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateBackend` if the name is taken.
    pub fn add_agent(&self, agent: SharedAgent) -> Result<(), RegistryError> {
        let name = agent.name().to_string();
        match self.agents.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RegistryError::DuplicateBackend(name));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(agent);
            }
        }
        self.states.insert(name.clone(), BackendState::default());
        self.order
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.clone());
        tracing::debug!(backend = %name, "Backend registered");
        Ok(())
    }

    /// Remove an adapter and its catalog entries.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::BackendNotFound` if no backend has that name.
    pub fn remove_agent(&self, name: &str) -> Result<SharedAgent, RegistryError> {
        let (_, agent) = self
            .agents
            .remove(name)
            .ok_or_else(|| RegistryError::BackendNotFound(name.to_string()))?;
        self.states.remove(name);
        self.order
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|n| n != name);

        let next = self.catalog().without_backend(name);
        self.swap_catalog(next);
        Ok(agent)
    }

    pub fn get_agent(&self, name: &str) -> Option<SharedAgent> {
        self.agents.get(name).map(|a| Arc::clone(a.value()))
    }

    /// Backend names in registration order.
    pub fn agent_names(&self) -> Vec<String> {
        self.order
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Record the outcome of a health probe.
    pub fn update_status(
        &self,
        name: &str,
        status: BackendStatus,
        error: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut state = self
            .states
            .get_mut(name)
            .ok_or_else(|| RegistryError::BackendNotFound(name.to_string()))?;
        if state.status != status {
            tracing::info!(backend = %name, from = %state.status, to = %status, "Backend status changed");
        }
        state.status = status;
        state.last_health_check = Some(Utc::now());
        state.last_error = error;
        Ok(())
    }

    pub fn status(&self, name: &str) -> Option<BackendStatus> {
        self.states.get(name).map(|s| s.status)
    }

    /// Snapshot of every backend in registration order.
    pub fn backends(&self) -> Vec<BackendView> {
        let catalog = self.catalog();
        self.agent_names()
            .into_iter()
            .filter_map(|name| {
                let agent = self.get_agent(&name)?;
                let state = self
                    .states
                    .get(&name)
                    .map(|s| s.value().clone())
                    .unwrap_or_default();
                Some(BackendView {
                    model_count: catalog.for_backend(&name).count(),
                    backend_type: agent.profile().backend_type,
                    status: state.status,
                    last_health_check: state.last_health_check,
                    last_error: state.last_error,
                    name,
                })
            })
            .collect()
    }

    /// Raw catalog snapshot as last refreshed.
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap_catalog(&self, next: Catalog) {
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// Catalog as seen by the selector.
    ///
    /// Models of unhealthy backends are reported unavailable, and recorded
    /// performance replaces the adapter's latency and success figures.
    pub fn models(&self) -> Vec<ModelDescriptor> {
        let catalog = self.catalog();
        catalog
            .models()
            .iter()
            .map(|model| {
                let mut model = model.clone();
                if self.status(&model.backend) == Some(BackendStatus::Unhealthy) {
                    model.is_available = false;
                }
                if let Some(performance) = &self.performance {
                    performance.overlay(&mut model);
                }
                model
            })
            .collect()
    }

    /// Look up a model by id in the current view.
    pub fn find_model(&self, id: &ModelId) -> Option<ModelDescriptor> {
        let key = id.key();
        self.models().into_iter().find(|m| m.key() == key)
    }

    /// Re-list one backend's models and merge them into the catalog.
    ///
    /// A failed listing keeps the backend's previous entries but marks them
    /// unavailable.
    pub async fn refresh_backend(&self, name: &str) -> Result<usize, RegistryError> {
        let agent = self
            .get_agent(name)
            .ok_or_else(|| RegistryError::BackendNotFound(name.to_string()))?;

        let listed = agent.list_models().await;
        let current = self.catalog();
        let (next, count) = match listed {
            Ok(models) => {
                let count = models.len();
                (current.with_backend(name, models), count)
            }
            Err(e) => {
                tracing::warn!(backend = %name, error = %e, "Model listing failed, keeping stale entries");
                let stale: Vec<ModelDescriptor> = current
                    .for_backend(name)
                    .cloned()
                    .map(|mut m| {
                        m.is_available = false;
                        m
                    })
                    .collect();
                (current.with_backend(name, stale), 0)
            }
        };
        self.swap_catalog(next);
        tracing::debug!(backend = %name, models = count, "Catalog refreshed for backend");
        Ok(count)
    }

    /// Re-list every backend concurrently and swap in a fresh catalog.
    pub async fn refresh_catalog(&self) -> usize {
        let agents: Vec<(String, SharedAgent)> = self
            .agent_names()
            .into_iter()
            .filter_map(|name| self.get_agent(&name).map(|agent| (name, agent)))
            .collect();

        let listings = futures::future::join_all(agents.iter().map(|(_, agent)| agent.list_models())).await;

        let previous = self.catalog();
        let mut models = Vec::new();
        for ((name, _), listing) in agents.iter().zip(listings) {
            match listing {
                Ok(listed) => models.extend(listed),
                Err(e) => {
                    tracing::warn!(backend = %name, error = %e, "Model listing failed, keeping stale entries");
                    models.extend(previous.for_backend(name).cloned().map(|mut m| {
                        m.is_available = false;
                        m
                    }));
                }
            }
        }

        let next = Catalog::new(models);
        let count = next.len();
        self.swap_catalog(next);
        tracing::info!(models = count, backends = agents.len(), "Catalog refreshed");
        count
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
