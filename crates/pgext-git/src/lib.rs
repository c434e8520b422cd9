//! Git plumbing for pgext-forge.
//!
//! - [`trust`]: the allow-list every repository URL is checked against
//! - [`remote`]: remote ref listing and tag selection
//! - [`resolver`]: concurrent tag-to-commit resolution into a manifest
//! - [`fetch`]: checkout of a pinned commit into a work directory
//! - [`interrupt`]: cancellation and deadlines for blocking libgit2 calls

pub mod error;
pub mod fetch;
pub mod interrupt;
pub mod remote;
pub mod resolver;
pub mod trust;

pub use error::{Error, Result};
pub use fetch::{GitFetcher, SourceFetcher};
pub use interrupt::{Interrupt, NetworkTimeouts};
pub use remote::{Git2Remote, RemoteRef, RemoteRefs, select_tag};
pub use resolver::{ResolveErrorKind, ResolveFailure, ResolveOptions, ResolveReport, Resolver};
pub use trust::{RepositoryLocation, TrustPolicy};
