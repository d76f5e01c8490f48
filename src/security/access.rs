//! Per-caller model access grants.
//!
//! Grants are glob patterns over model ids (`openai:*`, `*:llama3*`,
//! `anthropic:claude-3-haiku-*`). A caller may use a model if any of its own
//! patterns, or any pattern granted to `*`, matches the model id.

use super::SecurityError;
use dashmap::DashMap;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;

/// Caller id whose grants apply to everyone.
pub const ANY_CALLER: &str = "*";

#[derive(Debug, Clone)]
struct Grants {
    patterns: Vec<String>,
    matcher: GlobSet,
}

impl Grants {
    fn build(patterns: Vec<String>) -> Result<Self, SecurityError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = Glob::new(pattern).map_err(|e| SecurityError::InvalidGrant {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let matcher = builder.build().map_err(|e| SecurityError::InvalidGrant {
            pattern: patterns.join(","),
            message: e.to_string(),
        })?;
        Ok(Self { patterns, matcher })
    }
}

/// Access-control list consulted by the gateway before dispatch.
#[derive(Debug, Default)]
pub struct AccessControl {
    grants: DashMap<String, Grants>,
    /// Callers with no grants at all are allowed when set.
    default_allow: bool,
}

impl AccessControl {
    pub fn new(default_allow: bool) -> Self {
        Self {
            grants: DashMap::new(),
            default_allow,
        }
    }

    /// Build from a `caller -> patterns` table, typically from config.
    pub fn from_grants(
        grants: &HashMap<String, Vec<String>>,
        default_allow: bool,
    ) -> Result<Self, SecurityError> {
        let acl = Self::new(default_allow);
        for (caller, patterns) in grants {
            for pattern in patterns {
                acl.grant(caller, pattern)?;
            }
        }
        Ok(acl)
    }

    pub fn grant(&self, caller: &str, pattern: &str) -> Result<(), SecurityError> {
        let mut patterns = self
            .grants
            .get(caller)
            .map(|g| g.patterns.clone())
            .unwrap_or_default();
        if patterns.iter().any(|p| p == pattern) {
            return Ok(());
        }
        patterns.push(pattern.to_string());
        let grants = Grants::build(patterns)?;
        self.grants.insert(caller.to_string(), grants);
        tracing::debug!(caller = %caller, pattern = %pattern, "Access granted");
        Ok(())
    }

    /// Remove one pattern. Returns whether it was present.
    pub fn revoke(&self, caller: &str, pattern: &str) -> Result<bool, SecurityError> {
        let Some(existing) = self.grants.get(caller).map(|g| g.patterns.clone()) else {
            return Ok(false);
        };
        let remaining: Vec<String> = existing.iter().filter(|p| *p != pattern).cloned().collect();
        if remaining.len() == existing.len() {
            return Ok(false);
        }
        if remaining.is_empty() {
            self.grants.remove(caller);
        } else {
            self.grants
                .insert(caller.to_string(), Grants::build(remaining)?);
        }
        Ok(true)
    }

    pub fn is_allowed(&self, caller: &str, model_id: &str) -> bool {
        let own = self.grants.get(caller).map(|g| g.matcher.is_match(model_id));
        let shared = self
            .grants
            .get(ANY_CALLER)
            .map(|g| g.matcher.is_match(model_id))
            .unwrap_or(false);
        match own {
            Some(matched) => matched || shared,
            None => shared || self.default_allow,
        }
    }

    pub fn check(&self, caller: &str, model_id: &str) -> Result<(), SecurityError> {
        if self.is_allowed(caller, model_id) {
            Ok(())
        } else {
            Err(SecurityError::AccessDenied {
                caller: caller.to_string(),
                model: model_id.to_string(),
            })
        }
    }

    pub fn patterns_for(&self, caller: &str) -> Vec<String> {
        self.grants
            .get(caller)
            .map(|g| g.patterns.clone())
            .unwrap_or_default()
    }
}
