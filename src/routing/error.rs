//! Error types for selection failures

use thiserror::Error;

/// Errors that can occur during model selection
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    /// The candidate list was empty, so not even degraded mode applies
    #[error("No models available for scenario '{scenario}'")]
    NoModels { scenario: String },
}
