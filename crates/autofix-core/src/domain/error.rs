//! Domain-level error taxonomy for autofix.

use std::path::PathBuf;

/// autofix pipeline errors.
///
/// Validation failures (`BuildFailed`, `RuntimeFailed`) are not errors; they
/// are reported as [`crate::ValidationOutcome`] values.
#[derive(Debug, thiserror::Error)]
pub enum AutofixError {
    #[error("source file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {reason}", .path.display())]
    ReadError { path: PathBuf, reason: String },

    #[error("completion service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("completion service rejected credentials (status {status})")]
    AuthError { status: u16 },

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("failed to write candidate to {}: {reason}", .path.display())]
    WriteError { path: PathBuf, reason: String },

    #[error("publish failed during {step}: {reason}")]
    PublishError { step: String, reason: String },

    #[error("another run holds the lock at {}", .0.display())]
    LockHeld(PathBuf),

    #[error("invalid run transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("git error: {0}")]
    GitError(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AutofixError {
    /// Short machine-readable name, used in run reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AutofixError::NotFound(_) => "not_found",
            AutofixError::ReadError { .. } => "read_error",
            AutofixError::ServiceUnavailable(_) => "service_unavailable",
            AutofixError::AuthError { .. } => "auth_error",
            AutofixError::MalformedResponse(_) => "malformed_response",
            AutofixError::WriteError { .. } => "write_error",
            AutofixError::PublishError { .. } => "publish_error",
            AutofixError::LockHeld(_) => "lock_held",
            AutofixError::InvalidTransition { .. } => "invalid_transition",
            AutofixError::InvalidConfig(_) => "invalid_config",
            AutofixError::GitError(_) => "git_error",
            AutofixError::Serialization(_) => "serialization",
            AutofixError::Io(_) => "io",
        }
    }
}

/// Result type for autofix domain operations.
pub type Result<T> = std::result::Result<T, AutofixError>;
