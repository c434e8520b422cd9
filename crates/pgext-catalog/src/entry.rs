//! Typed catalog entries.
//!
//! A [`CatalogEntry`] is always in a valid shape: the schema layer in
//! [`crate::schema`] is the only way authored documents become entries, and
//! [`CatalogEntry::check`] re-asserts the cross-field rules whenever entries
//! are read back from a generated manifest.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What kind of artifact an entry produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Activated downstream with `CREATE EXTENSION`.
    Extension,
    /// Library or binary with no SQL-level activation.
    Tool,
    /// Ships with the base runtime; never built.
    Builtin,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::Tool => "tool",
            Self::Builtin => "builtin",
        }
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "extension" => Ok(Self::Extension),
            "tool" => Ok(Self::Tool),
            "builtin" => Ok(Self::Builtin),
            other => Err(format!(
                "unknown kind '{other}' (expected extension, tool or builtin)"
            )),
        }
    }
}

/// Where an entry's source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Source {
    /// Part of the base runtime; nothing to fetch.
    Builtin,
    /// A mutable tag that must be resolved to a commit before building.
    GitTag { repository: String, tag: String },
    /// An already immutable commit or ref.
    GitRef {
        repository: String,
        #[serde(rename = "ref")]
        git_ref: String,
    },
}

impl Source {
    /// Repository URL, if the source is fetched at all.
    pub fn repository(&self) -> Option<&str> {
        match self {
            Self::Builtin => None,
            Self::GitTag { repository, .. } | Self::GitRef { repository, .. } => Some(repository),
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin)
    }
}

/// Native build systems the dispatcher knows how to drive.
///
/// Adding a backend means adding a variant here and its strategy in
/// `pgext-build`; the dispatcher itself never branches on the variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum Backend {
    /// PostgreSQL extension makefiles (`USE_PGXS=1`).
    Pgxs,
    /// Rust extensions built with `cargo pgrx`.
    Pgrx,
    Cmake,
    Meson,
    /// `./configure && make && make install`.
    Autotools,
    /// Plain makefiles that know nothing about PostgreSQL.
    Make,
    /// An opaque script shipped in the source tree.
    Script { script: String },
}

impl Backend {
    /// Parse a backend name; `script` is required for the script backend.
    pub fn parse(name: &str, script: Option<&str>) -> std::result::Result<Self, String> {
        match name {
            "pgxs" => Ok(Self::Pgxs),
            "pgrx" => Ok(Self::Pgrx),
            "cmake" => Ok(Self::Cmake),
            "meson" => Ok(Self::Meson),
            "autotools" => Ok(Self::Autotools),
            "make" => Ok(Self::Make),
            "script" => match script {
                Some(s) if !s.trim().is_empty() => Ok(Self::Script {
                    script: s.to_string(),
                }),
                _ => Err("the script backend requires a non-empty 'script'".to_string()),
            },
            other => Err(format!(
                "unknown backend '{other}' (expected pgxs, pgrx, cmake, meson, autotools, make or script)"
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pgxs => "pgxs",
            Self::Pgrx => "pgrx",
            Self::Cmake => "cmake",
            Self::Meson => "meson",
            Self::Autotools => "autotools",
            Self::Make => "make",
            Self::Script { .. } => "script",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How to build an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(flatten)]
    pub backend: Backend,
    /// Build this subdirectory of the fetched tree instead of its root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable_default_features: bool,
    /// Substitution rules applied to the fetched tree, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<String>,
}

impl BuildSpec {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            subdir: None,
            features: Vec::new(),
            disable_default_features: false,
            patches: Vec::new(),
        }
    }
}

/// Runtime classification consumed by the preload and bootstrap collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    #[serde(default)]
    pub requires_preload: bool,
    #[serde(default)]
    pub enabled_by_default: bool,
    /// No SQL-level activation artifact (pure hook library or SQL schema).
    #[serde(default)]
    pub preload_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preload_library_name: Option<String>,
}

/// Enablement profile.
///
/// `Production` honours `enabled` as written. `Regression` additionally
/// enables disabled entries flagged `enabled_in_regression`, so the broader
/// test image still exercises them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Production,
    Regression,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Regression => "regression",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "production" => Ok(Self::Production),
            "regression" => Ok(Self::Regression),
            other => Err(format!(
                "unknown profile '{other}' (expected production or regression)"
            )),
        }
    }
}

/// Which of the three mutually exclusive delivery paths an entry takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBucket {
    /// Ships with the base runtime.
    Builtin,
    /// Installed from a system package repository.
    Package,
    /// Compiled from source by the dispatcher.
    Source,
}

/// One extension or tool in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub kind: EntryKind,
    pub category: String,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
    #[serde(default)]
    pub runtime: RuntimeSpec,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<String>,
    /// Package reference when the artifact comes from a system package
    /// repository instead of being compiled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_via: Option<String>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled_in_regression: bool,
}

impl CatalogEntry {
    /// Whether the entry is enabled under `profile`.
    pub fn is_enabled(&self, profile: Profile) -> bool {
        match profile {
            Profile::Production => self.enabled,
            Profile::Regression => self.enabled || self.enabled_in_regression,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.kind == EntryKind::Builtin || self.source.is_builtin()
    }

    pub fn is_package_installed(&self) -> bool {
        !self.is_builtin() && self.install_via.is_some()
    }

    /// Whether the dispatcher compiles this entry (ignoring enablement).
    pub fn needs_build(&self) -> bool {
        !self.is_builtin() && self.install_via.is_none()
    }

    pub fn bucket(&self) -> SourceBucket {
        if self.is_builtin() {
            SourceBucket::Builtin
        } else if self.install_via.is_some() {
            SourceBucket::Package
        } else {
            SourceBucket::Source
        }
    }

    /// Library name registered for preloading: `preload_library_name` when
    /// set, else the entry name.
    pub fn library_name(&self) -> &str {
        self.runtime
            .preload_library_name
            .as_deref()
            .unwrap_or(&self.name)
    }

    /// Whether the bootstrap descriptor must activate this entry when it is
    /// enabled by default.
    pub fn requires_activation(&self) -> bool {
        self.runtime.enabled_by_default
            && !self.runtime.preload_only
            && self.kind == EntryKind::Extension
    }

    /// Re-assert the cross-field rules of a valid entry.
    pub fn check(&self) -> Result<()> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(Error::schema(name, "name", "must not be empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            || name.starts_with('.')
        {
            return Err(Error::schema(
                name,
                "name",
                "must contain only alphanumeric characters, '-', '_' or '.', and not start with '.'",
            ));
        }
        if self.category.trim().is_empty() {
            return Err(Error::schema(name, "category", "must not be empty"));
        }
        if self.kind == EntryKind::Builtin && !self.source.is_builtin() {
            return Err(Error::schema(
                name,
                "source",
                "builtin entries must use a builtin source",
            ));
        }
        match &self.source {
            Source::Builtin => {}
            Source::GitTag { repository, tag } => {
                if repository.trim().is_empty() {
                    return Err(Error::schema(name, "source.repository", "must not be empty"));
                }
                if tag.trim().is_empty() {
                    return Err(Error::schema(name, "source.tag", "must not be empty"));
                }
            }
            Source::GitRef {
                repository,
                git_ref,
            } => {
                if repository.trim().is_empty() {
                    return Err(Error::schema(name, "source.repository", "must not be empty"));
                }
                if git_ref.trim().is_empty() {
                    return Err(Error::schema(name, "source.ref", "must not be empty"));
                }
            }
        }
        match &self.build {
            None if !self.source.is_builtin() => {
                return Err(Error::schema(
                    name,
                    "build",
                    "required for entries with a non-builtin source",
                ));
            }
            Some(build) => {
                if let Some(subdir) = &build.subdir {
                    let path = Path::new(subdir);
                    if subdir.trim().is_empty()
                        || path.has_root()
                        || path.components().any(|c| c == Component::ParentDir)
                    {
                        return Err(Error::schema(
                            name,
                            "build.subdir",
                            "must be a relative path inside the source tree",
                        ));
                    }
                }
                if build.patches.iter().any(|p| p.trim().is_empty()) {
                    return Err(Error::schema(name, "build.patches", "patches must not be empty"));
                }
            }
            None => {}
        }
        if !self.enabled
            && self
                .disabled_reason
                .as_deref()
                .is_none_or(|r| r.trim().is_empty())
        {
            return Err(Error::schema(
                name,
                "disabled_reason",
                "required when enabled = false",
            ));
        }
        if self.dependencies.contains(name) {
            return Err(Error::schema(name, "dependencies", "an entry cannot depend on itself"));
        }
        Ok(())
    }
}
