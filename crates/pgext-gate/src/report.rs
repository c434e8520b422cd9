//! Gate findings and the accumulated report.

use std::fmt;

use serde::Serialize;

/// Attribution used for findings about the catalog as a whole.
pub const CATALOG_SCOPE: &str = "<catalog>";

/// Which pass produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePass {
    Prebuild,
    Postbuild,
}

/// The rule a finding violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    UnknownDependency,
    /// Enabled entry depends on an entry disabled under the profile.
    DisabledDependency,
    Cycle,
    MissingDisabledReason,
    /// Catalog declares a preloaded library the preload descriptor omits.
    PreloadNotDeclared,
    /// Preload descriptor names a library no catalog entry declares.
    PreloadOrphan,
    NotActivated,
    CountMismatch,
    MissingArtifacts,
    StaleArtifacts,
    MissingPreloadLibrary,
}

impl GateKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::UnknownDependency => "UnknownDependencyError",
            Self::DisabledDependency => "DisabledDependencyError",
            Self::Cycle => "CycleError",
            Self::MissingDisabledReason => "MissingDisabledReasonError",
            Self::PreloadNotDeclared => "PreloadNotDeclaredError",
            Self::PreloadOrphan => "PreloadOrphanError",
            Self::NotActivated => "NotActivatedError",
            Self::CountMismatch => "CountMismatchError",
            Self::MissingArtifacts => "MissingArtifactsError",
            Self::StaleArtifacts => "StaleArtifactsError",
            Self::MissingPreloadLibrary => "MissingPreloadLibraryError",
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One violated rule, attributed to an entry (or [`CATALOG_SCOPE`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateFailure {
    pub entry: String,
    pub kind: GateKind,
    pub detail: String,
}

impl GateFailure {
    pub fn new(entry: impl Into<String>, kind: GateKind, detail: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.entry, self.kind, self.detail)
    }
}

/// Every finding of one or more passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub passes: Vec<GatePass>,
    pub failures: Vec<GateFailure>,
}

impl GateReport {
    pub fn new(pass: GatePass) -> Self {
        Self {
            passes: vec![pass],
            failures: Vec::new(),
        }
    }

    pub fn push(&mut self, failure: GateFailure) {
        tracing::debug!(entry = %failure.entry, kind = %failure.kind, "gate finding");
        self.failures.push(failure);
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Findings of a given kind.
    pub fn of_kind(&self, kind: GateKind) -> impl Iterator<Item = &GateFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }

    /// Combine the findings of two passes.
    pub fn merge(mut self, other: GateReport) -> Self {
        for pass in other.passes {
            if !self.passes.contains(&pass) {
                self.passes.push(pass);
            }
        }
        self.passes.sort();
        self.failures.extend(other.failures);
        self
    }
}
