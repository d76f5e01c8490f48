//! Security layer: encrypted credentials, access grants and the audit trail.

pub mod access;
pub mod audit;
pub mod error;
pub mod vault;

pub use access::AccessControl;
pub use audit::{AuditAction, AuditEvent, AuditLog, AuditOutcome, AuditSink};
pub use error::SecurityError;
pub use vault::{CredentialVault, EncryptedSecret, KeyRing};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `[security]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enforce `grants` in the gateway.
    pub access_control: bool,
    /// Allow callers that have no grants of their own.
    pub default_allow: bool,
    /// Caller id (or `*`) to model-id glob patterns.
    pub grants: HashMap<String, Vec<String>>,
    /// Env var holding a base64 32-byte master key. A random key is
    /// generated when unset.
    pub master_key_env: Option<String>,
    /// Credential name to the env var holding its plaintext. Loaded into the
    /// vault at startup and referenced from `backends[].credential`.
    pub credentials: HashMap<String, String>,
    pub audit_capacity: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            access_control: false,
            default_allow: true,
            grants: HashMap::new(),
            master_key_env: None,
            credentials: HashMap::new(),
            audit_capacity: AuditLog::DEFAULT_CAPACITY,
        }
    }
}

impl SecurityConfig {
    /// Build the vault and load every configured credential into it.
    /// Missing env vars are skipped with a warning.
    pub fn build_vault(&self) -> Result<CredentialVault, SecurityError> {
        let ring = match &self.master_key_env {
            Some(var) => match std::env::var(var) {
                Ok(encoded) => KeyRing::from_base64(&encoded)?,
                Err(_) => {
                    tracing::warn!(env = %var, "Master key env var not set, using ephemeral key");
                    KeyRing::generate()
                }
            },
            None => KeyRing::generate(),
        };
        let vault = CredentialVault::new(ring);
        for (name, var) in &self.credentials {
            match std::env::var(var) {
                Ok(value) => vault.store(name, &value)?,
                Err(_) => tracing::warn!(credential = %name, env = %var, "Credential env var not set"),
            }
        }
        Ok(vault)
    }

    /// Access list when enforcement is enabled.
    pub fn build_access_control(&self) -> Result<Option<AccessControl>, SecurityError> {
        if !self.access_control {
            return Ok(None);
        }
        AccessControl::from_grants(&self.grants, self.default_allow).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_disable_enforcement() {
        let config = SecurityConfig::default();
        assert!(config.build_access_control().unwrap().is_none());
    }

    #[test]
    fn test_build_vault_loads_env_credentials() {
        std::env::set_var("MERIDIAN_TEST_VAULT_CRED", "sk-from-env");
        let config = SecurityConfig {
            credentials: HashMap::from([
                ("openai".to_string(), "MERIDIAN_TEST_VAULT_CRED".to_string()),
                ("missing".to_string(), "MERIDIAN_TEST_VAULT_UNSET".to_string()),
            ]),
            ..Default::default()
        };
        let vault = config.build_vault().unwrap();
        assert_eq!(vault.get("openai").unwrap(), "sk-from-env");
        assert!(vault.get("missing").is_err());
        std::env::remove_var("MERIDIAN_TEST_VAULT_CRED");
    }

    #[test]
    fn test_enforcement_builds_acl() {
        let config = SecurityConfig {
            access_control: true,
            default_allow: false,
            grants: HashMap::from([("ci".to_string(), vec!["ollama:*".to_string()])]),
            ..Default::default()
        };
        let acl = config.build_access_control().unwrap().unwrap();
        assert!(acl.is_allowed("ci", "ollama:llama3"));
        assert!(!acl.is_allowed("other", "ollama:llama3"));
    }
}
