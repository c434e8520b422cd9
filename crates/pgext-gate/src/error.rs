//! Error types for pgext-gate

/// Result type for pgext-gate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reading gate inputs. Gate findings are never errors; they are
/// [`GateFailure`](crate::GateFailure) values in a report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read {kind} descriptor: {source}")]
    Descriptor {
        kind: &'static str,
        #[source]
        source: pgext_fs::Error,
    },

    #[error(transparent)]
    Fs(#[from] pgext_fs::Error),
}
