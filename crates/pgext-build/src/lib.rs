//! Build dispatch for pgext-forge.
//!
//! A resolved entry goes through fetch, patch, backend invocation and
//! artifact collection in [`dispatcher`]; [`scheduler`] runs a whole
//! [`BuildPlan`](pgext_catalog::BuildPlan) level by level with bounded
//! parallelism in fail-fast or best-effort mode.

pub mod artifacts;
pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod patch;
pub mod runner;
pub mod scheduler;

pub use backend::{BackendContext, BuildBackend, Step, strategy};
pub use dispatcher::{BuildOutput, DispatchOptions, Dispatcher};
pub use error::{BuildErrorKind, BuildFailure, Error, Result};
pub use patch::{PatchOutcome, PatchRule};
pub use scheduler::{BuildMode, BuildReport, Scheduler};
