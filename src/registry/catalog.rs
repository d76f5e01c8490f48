use crate::agent::ModelDescriptor;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Immutable set of model descriptors across all backends.
///
/// Keys (`backend:model`) are unique: when the same key is supplied twice the
/// later descriptor replaces the earlier one in its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    models: Vec<ModelDescriptor>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl Catalog {
    pub fn new(models: impl IntoIterator<Item = ModelDescriptor>) -> Self {
        let mut ordered: Vec<ModelDescriptor> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for model in models {
            match index.get(&model.key()) {
                Some(&pos) => ordered[pos] = model,
                None => {
                    index.insert(model.key(), ordered.len());
                    ordered.push(model);
                }
            }
        }
        Self {
            models: ordered,
            refreshed_at: Some(Utc::now()),
        }
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn get(&self, key: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.key() == key)
    }

    pub fn for_backend(&self, backend: &str) -> impl Iterator<Item = &ModelDescriptor> {
        let backend = backend.to_string();
        self.models.iter().filter(move |m| m.backend == backend)
    }

    pub fn available(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter().filter(|m| m.is_available)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// New catalog with `backend`'s entries replaced by `models`. Other
    /// backends keep their entries and relative order.
    pub fn with_backend(&self, backend: &str, models: Vec<ModelDescriptor>) -> Self {
        let mut merged: Vec<ModelDescriptor> = Vec::with_capacity(self.models.len() + models.len());
        let mut inserted = false;
        let mut pending = Some(models);
        for model in &self.models {
            if model.backend == backend {
                if !inserted {
                    merged.extend(pending.take().unwrap_or_default());
                    inserted = true;
                }
            } else {
                merged.push(model.clone());
            }
        }
        if let Some(rest) = pending {
            merged.extend(rest);
        }
        Self::new(merged)
    }

    /// New catalog without `backend`'s entries.
    pub fn without_backend(&self, backend: &str) -> Self {
        Self::new(
            self.models
                .iter()
                .filter(|m| m.backend != backend)
                .cloned(),
        )
    }
}
