//! Gateway error type and its stable error codes.

use crate::agent::{AgentError, InvalidRequest};
use crate::retry::RetryError;
use crate::routing::SelectionError;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Failure of a gateway call, as surfaced to callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequest),

    #[error("model '{model}' not found in catalog")]
    ModelNotFound { model: String },

    #[error("no models available for scenario '{scenario}'")]
    NoModels { scenario: String },

    #[error("caller '{caller}' may not use {model}")]
    AccessDenied { caller: String, model: String },

    /// Network failure, 429 or 5xx that survived every retry
    #[error("backend '{backend}' unavailable after {attempts} attempt(s): {message}")]
    ProviderUnavailable {
        backend: String,
        attempts: u32,
        message: String,
    },

    #[error("backend '{backend}' timed out after {timeout_ms}ms ({attempts} attempt(s))")]
    Timeout {
        backend: String,
        timeout_ms: u64,
        attempts: u32,
    },

    /// Non-retryable 4xx from the upstream
    #[error("backend '{backend}' rejected the request ({status}): {message}")]
    UpstreamRejected {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("backend '{backend}' failed: {message}")]
    Upstream { backend: String, message: String },
}

impl GatewayError {
    /// Stable, machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            GatewayError::NoModels { .. } => "NO_MODELS",
            GatewayError::AccessDenied { .. } => "ACCESS_DENIED",
            GatewayError::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            GatewayError::Timeout { .. } => "TIMEOUT",
            GatewayError::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
            GatewayError::Upstream { .. } => "UNKNOWN_UPSTREAM_ERROR",
        }
    }

    /// Lowercase code used as the `error_type` metric label.
    pub fn error_type(&self) -> String {
        self.code().to_lowercase()
    }

    /// Map an adapter error after `attempts` tries against `backend`.
    pub fn from_agent(error: AgentError, backend: &str, attempts: u32) -> Self {
        let backend = backend.to_string();
        match error {
            AgentError::Network(message) => GatewayError::ProviderUnavailable {
                backend,
                attempts,
                message,
            },
            AgentError::Timeout(timeout_ms) => GatewayError::Timeout {
                backend,
                timeout_ms,
                attempts,
            },
            AgentError::Upstream { status, message } if status == 429 || status >= 500 => {
                GatewayError::ProviderUnavailable {
                    backend,
                    attempts,
                    message: format!("{status}: {message}"),
                }
            }
            AgentError::Upstream { status, message } => GatewayError::UpstreamRejected {
                backend,
                status,
                message,
            },
            other @ (AgentError::Unsupported(_)
            | AgentError::InvalidResponse(_)
            | AgentError::Configuration(_)) => GatewayError::Upstream {
                backend,
                message: other.to_string(),
            },
        }
    }

    pub fn from_retry(error: RetryError<AgentError>, backend: &str) -> Self {
        let attempts = error.attempts();
        Self::from_agent(error.into_inner(), backend, attempts)
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<SelectionError> for GatewayError {
    fn from(error: SelectionError) -> Self {
        match error {
            SelectionError::NoModels { scenario } => GatewayError::NoModels { scenario },
        }
    }
}

/// Wire shape of a [`GatewayError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl Serialize for GatewayError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body().serialize(serializer)
    }
}
