//! Error types for pgext-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that end a command before it can report per-entry results
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Catalog(#[from] pgext_catalog::Error),

    #[error(transparent)]
    Fs(#[from] pgext_fs::Error),

    #[error(transparent)]
    Git(#[from] pgext_git::Error),

    #[error(transparent)]
    Build(#[from] pgext_build::Error),

    #[error(transparent)]
    Gate(#[from] pgext_gate::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }
}
