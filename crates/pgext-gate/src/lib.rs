//! Validation gates for pgext-forge.
//!
//! The [`prebuild`] gate checks the catalog on its own and against the
//! external preload and bootstrap descriptors; the [`postbuild`] gate checks
//! the staging tree a build left behind. Both accumulate every failure into
//! a [`GateReport`].

pub mod descriptor;
pub mod error;
pub mod postbuild;
pub mod prebuild;
pub mod report;

pub use descriptor::DeclaredNames;
pub use error::{Error, Result};
pub use postbuild::PostbuildGate;
pub use prebuild::PrebuildGate;
pub use report::{CATALOG_SCOPE, GateFailure, GateKind, GatePass, GateReport};
