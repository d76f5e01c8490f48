use crate::gateway::GatewayError;
use thiserror::Error;

/// Failure reported by a retrieval, compression, tool or cache collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("retrieval failed: {0}")]
    Retrieval(CollaboratorError),

    #[error("compression failed: {0}")]
    Compression(CollaboratorError),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("tool '{tool}' failed: {source}")]
    Tool {
        tool: String,
        source: CollaboratorError,
    },

    #[error("no {0} configured")]
    MissingCollaborator(&'static str),

    /// Aborts the run before any step executes.
    #[error("duplicate step id '{0}'")]
    DuplicateStep(String),
}

impl WorkflowError {
    /// Stable code recorded on fallen-back steps.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Gateway(e) => e.code(),
            WorkflowError::Retrieval(_) => "RETRIEVAL_FAILED",
            WorkflowError::Compression(_) => "COMPRESSION_FAILED",
            WorkflowError::UnknownTool(_) => "UNKNOWN_TOOL",
            WorkflowError::Tool { .. } => "TOOL_FAILED",
            WorkflowError::MissingCollaborator(_) => "MISSING_COLLABORATOR",
            WorkflowError::DuplicateStep(_) => "DUPLICATE_STEP",
        }
    }
}
