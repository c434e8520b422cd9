//! Extension catalog for pgext-forge.
//!
//! This crate provides the typed catalog model and its schema validation,
//! the frozen (resolved) manifest that downstream packaging reads, and the
//! dependency sequencer that turns enabled entries into a build plan.

pub mod catalog;
pub mod dependency;
pub mod entry;
pub mod error;
pub mod resolved;
pub mod schema;

/// Default filename of the authored catalog.
pub const CATALOG_FILENAME: &str = "extensions.toml";

/// Default filename of the generated manifest artifact.
pub const MANIFEST_FILENAME: &str = "extensions.lock.json";

/// Format version written into every manifest.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

pub use catalog::{Catalog, CatalogStats, CatalogSummary};
pub use dependency::{BuildPlan, DependencyGraph, Planned, sequence, unknown_dependencies};
pub use entry::{
    Backend, BuildSpec, CatalogEntry, EntryKind, Profile, RuntimeSpec, Source, SourceBucket,
};
pub use error::{Error, Result};
pub use resolved::{
    ArtifactRecord, BuildMetadata, BuildRecord, BuildStatus, PinnedSource, ResolvedCatalogEntry,
    ResolvedManifest,
};
