//! Error types for agent operations.

use crate::retry::Retryable;
use thiserror::Error;

/// Errors that can occur during agent operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// Network connectivity error (DNS, connection refused, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded deadline.
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Backend returned an error response (4xx, 5xx).
    #[error("Backend error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Method not supported by this agent implementation.
    #[error("Method '{0}' not supported by this agent")]
    Unsupported(&'static str),

    /// Backend response doesn't match expected format.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Agent configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AgentError {
    /// Map a transport failure, keeping timeouts distinguishable.
    pub fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            AgentError::Timeout(timeout_ms)
        } else {
            AgentError::Network(err.to_string())
        }
    }

    /// Build an `Upstream` error from a non-success response, consuming its body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        AgentError::Upstream { status, message }
    }

    /// Short label used for metrics and error codes.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Network(_) => "network",
            AgentError::Timeout(_) => "timeout",
            AgentError::Upstream { .. } => "upstream",
            AgentError::Unsupported(_) => "unsupported",
            AgentError::InvalidResponse(_) => "invalid_response",
            AgentError::Configuration(_) => "configuration",
        }
    }
}

impl Retryable for AgentError {
    fn is_retryable(&self) -> bool {
        match self {
            AgentError::Network(_) | AgentError::Timeout(_) | AgentError::InvalidResponse(_) => {
                true
            }
            AgentError::Upstream { status, .. } => *status == 429 || *status >= 500,
            AgentError::Unsupported(_) | AgentError::Configuration(_) => false,
        }
    }
}
