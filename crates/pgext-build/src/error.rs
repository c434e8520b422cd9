//! Error types for pgext-build
//!
//! [`Error`] covers failures of the run itself (invalid plan, unusable
//! layout). Per-entry failures are [`BuildFailure`] values, collected in the
//! [`BuildReport`](crate::scheduler::BuildReport).

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Result type for pgext-build operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a build run before or outside per-entry work
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] pgext_catalog::Error),

    #[error(transparent)]
    Fs(#[from] pgext_fs::Error),
}

/// What went wrong while building one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildErrorKind {
    /// Network failure, missing commit, or unusable checkout.
    Fetch { reason: String },
    FetchTimeout { seconds: u64 },
    UntrustedSource { reason: String },
    /// A patch rule matched nothing in the source tree.
    PatchNotMatched { patch: String },
    InvalidPatch { patch: String, reason: String },
    BackendInvocation {
        command: String,
        exit_code: Option<i32>,
        log_path: PathBuf,
        log_tail: Vec<String>,
    },
    BackendTimeout {
        command: String,
        seconds: u64,
        log_path: PathBuf,
    },
    /// The backend reported success but produced no usable artifacts.
    ArtifactCollection { reason: String },
    DependencyFailed { dependency: String },
    /// The build task panicked or was aborted before reporting an outcome.
    TaskPanicked { reason: String },
    Cancelled,
}

impl BuildErrorKind {
    /// Short taxonomy label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "FetchError",
            Self::FetchTimeout { .. } => "FetchTimeout",
            Self::UntrustedSource { .. } => "UntrustedSourceError",
            Self::PatchNotMatched { .. } => "PatchNotMatchedError",
            Self::InvalidPatch { .. } => "InvalidPatch",
            Self::BackendInvocation { .. } => "BackendInvocationError",
            Self::BackendTimeout { .. } => "BackendTimeout",
            Self::ArtifactCollection { .. } => "ArtifactCollectionError",
            Self::DependencyFailed { .. } => "DependencyFailed",
            Self::TaskPanicked { .. } => "BuildTaskPanicked",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Captured log lines attached to the failure, if any.
    pub fn log_tail(&self) -> &[String] {
        match self {
            Self::BackendInvocation { log_tail, .. } => log_tail,
            _ => &[],
        }
    }
}

impl fmt::Display for BuildErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.label())?;
        match self {
            Self::Fetch { reason } => write!(f, "{reason}"),
            Self::FetchTimeout { seconds } => write!(f, "fetch did not finish within {seconds}s"),
            Self::UntrustedSource { reason } => write!(f, "{reason}"),
            Self::PatchNotMatched { patch } => write!(f, "patch matched nothing: {patch}"),
            Self::InvalidPatch { patch, reason } => write!(f, "{reason}: {patch}"),
            Self::BackendInvocation {
                command,
                exit_code,
                log_path,
                ..
            } => match exit_code {
                Some(code) => write!(
                    f,
                    "`{command}` exited with code {code} (log: {})",
                    log_path.display()
                ),
                None => write!(
                    f,
                    "`{command}` did not exit normally (log: {})",
                    log_path.display()
                ),
            },
            Self::BackendTimeout {
                command,
                seconds,
                log_path,
            } => write!(
                f,
                "`{command}` did not finish within {seconds}s (log: {})",
                log_path.display()
            ),
            Self::ArtifactCollection { reason } => write!(f, "{reason}"),
            Self::DependencyFailed { dependency } => {
                write!(f, "dependency '{dependency}' did not build")
            }
            Self::TaskPanicked { reason } => write!(f, "build task died: {reason}"),
            Self::Cancelled => write!(f, "build cancelled"),
        }
    }
}

/// A per-entry build failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFailure {
    pub entry: String,
    #[serde(flatten)]
    pub kind: BuildErrorKind,
}

impl BuildFailure {
    pub fn new(entry: impl Into<String>, kind: BuildErrorKind) -> Self {
        Self {
            entry: entry.into(),
            kind,
        }
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entry, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_failure_display_names_entry_and_code() {
        let failure = BuildFailure::new(
            "pg_cron",
            BuildErrorKind::BackendInvocation {
                command: "make".into(),
                exit_code: Some(2),
                log_path: PathBuf::from("/work/logs/pg_cron.log"),
                log_tail: vec!["error: missing header".into()],
            },
        );
        assert_eq!(
            failure.to_string(),
            "pg_cron: BackendInvocationError: `make` exited with code 2 (log: /work/logs/pg_cron.log)"
        );
        assert_eq!(failure.kind.log_tail(), ["error: missing header".to_string()]);
    }

    #[test]
    fn test_patch_failure_includes_rule() {
        let failure = BuildFailure::new(
            "vector",
            BuildErrorKind::PatchNotMatched {
                patch: "Makefile:s/-march=native//g".into(),
            },
        );
        assert!(failure.to_string().contains("Makefile:s/-march=native//g"));
    }

    #[test]
    fn test_panicked_task_is_not_a_fetch_error() {
        let failure = BuildFailure::new(
            "age",
            BuildErrorKind::TaskPanicked {
                reason: "index out of bounds".into(),
            },
        );
        assert_eq!(
            failure.to_string(),
            "age: BuildTaskPanicked: build task died: index out of bounds"
        );
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "task_panicked");
    }

    #[test]
    fn test_json_shape() {
        let failure = BuildFailure::new(
            "a",
            BuildErrorKind::DependencyFailed {
                dependency: "b".into(),
            },
        );
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"entry": "a", "kind": "dependency_failed", "dependency": "b"})
        );
    }
}
