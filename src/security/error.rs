//! Error types for the security layer.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SecurityError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Unknown key id '{0}'")]
    UnknownKey(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Credential '{0}' not found")]
    CredentialNotFound(String),

    #[error("Invalid grant pattern '{pattern}': {message}")]
    InvalidGrant { pattern: String, message: String },

    #[error("Caller '{caller}' is not allowed to use model '{model}'")]
    AccessDenied { caller: String, model: String },
}
