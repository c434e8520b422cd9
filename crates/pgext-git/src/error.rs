//! Error types for pgext-git

/// Result type for pgext-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pgext-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] pgext_fs::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] pgext_catalog::Error),

    #[error("untrusted source '{repository}': {reason}")]
    UntrustedSource { repository: String, reason: String },

    #[error("tag '{tag}' not found in {repository}")]
    TagNotFound { repository: String, tag: String },

    #[error("ref '{git_ref}' not found in {repository}")]
    RefNotFound { repository: String, git_ref: String },

    #[error("{count} entries failed to resolve")]
    Unresolved { count: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("background task failed: {0}")]
    Task(String),
}

impl Error {
    /// Whether retrying the same network operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Git(e) => matches!(
                e.class(),
                git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Ssl
            ),
            _ => false,
        }
    }
}
