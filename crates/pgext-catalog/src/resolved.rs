//! The resolved (frozen) manifest artifact.
//!
//! A [`ResolvedManifest`] is the contract with downstream packaging: every
//! entry with its source pinned to an immutable commit, sorted by name, plus
//! the generation timestamp and, after a build, per-entry build metadata.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pgext_fs::ConfigStore;

use crate::catalog::{Catalog, CatalogSummary};
use crate::entry::{CatalogEntry, Profile, Source};
use crate::error::{Error, Result};

/// The immutable location an entry is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinnedSource {
    pub repository: String,
    pub commit: String,
}

/// A catalog entry whose source has been frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCatalogEntry {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    /// `None` exactly when the source is builtin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<PinnedSource>,
}

impl ResolvedCatalogEntry {
    /// Freeze an entry whose commit is already known.
    ///
    /// Builtin entries ignore `commit`; `git-ref` entries are pinned to their
    /// own ref and also ignore it.
    pub fn freeze(entry: CatalogEntry, commit: Option<String>) -> Result<Self> {
        let pinned = match &entry.source {
            Source::Builtin => None,
            Source::GitRef {
                repository,
                git_ref,
            } => Some(PinnedSource {
                repository: repository.clone(),
                commit: git_ref.clone(),
            }),
            Source::GitTag { repository, tag } => {
                let commit = commit.filter(|c| !c.trim().is_empty()).ok_or_else(|| {
                    Error::InvalidManifest {
                        reason: format!(
                            "entry '{}' has tag '{tag}' but no resolved commit",
                            entry.name
                        ),
                    }
                })?;
                Some(PinnedSource {
                    repository: repository.clone(),
                    commit,
                })
            }
        };
        Ok(Self { entry, pinned })
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn commit(&self) -> Option<&str> {
        self.pinned.as_ref().map(|p| p.commit.as_str())
    }

    /// The entry rewritten to fetch its pinned commit directly.
    ///
    /// Resolving the result again yields the same pin, which is what makes
    /// resolution idempotent.
    pub fn as_pinned_entry(&self) -> CatalogEntry {
        let mut entry = self.entry.clone();
        if let Some(pinned) = &self.pinned {
            entry.source = Source::GitRef {
                repository: pinned.repository.clone(),
                git_ref: pinned.commit.clone(),
            };
        }
        entry
    }

    fn check(&self) -> Result<()> {
        self.entry.check()?;
        let consistent = match (&self.entry.source, &self.pinned) {
            (Source::Builtin, None) => true,
            (Source::GitRef { repository, git_ref }, Some(p)) => {
                &p.repository == repository && &p.commit == git_ref
            }
            (Source::GitTag { repository, .. }, Some(p)) => {
                &p.repository == repository && !p.commit.trim().is_empty()
            }
            _ => false,
        };
        if consistent {
            Ok(())
        } else {
            Err(Error::InvalidManifest {
                reason: format!(
                    "entry '{}' has a pin that does not match its source",
                    self.entry.name
                ),
            })
        }
    }
}

/// Outcome of one entry in a build run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Built,
    Failed,
    Skipped,
}

/// One collected artifact, relative to the entry's staging directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub path: String,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub name: String,
    pub status: BuildStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRecord>,
}

/// Metadata attached to the manifest after a build run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub profile: Profile,
    pub entries: Vec<BuildRecord>,
}

/// The machine-readable manifest consumed by packaging and CI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedManifest {
    pub format_version: u32,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CatalogSummary>,
    pub entries: Vec<ResolvedCatalogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildMetadata>,
}

impl ResolvedManifest {
    /// Assemble a manifest; entries are sorted by name.
    pub fn new(
        mut entries: Vec<ResolvedCatalogEntry>,
        summary: Option<CatalogSummary>,
        generated_at: DateTime<Utc>,
    ) -> Result<Self> {
        entries.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));
        let manifest = Self {
            format_version: crate::MANIFEST_FORMAT_VERSION,
            generated_at,
            summary,
            entries,
            build: None,
        };
        manifest.check()?;
        Ok(manifest)
    }

    /// Structural validation of a manifest read from disk.
    pub fn check(&self) -> Result<()> {
        if self.format_version != crate::MANIFEST_FORMAT_VERSION {
            return Err(Error::InvalidManifest {
                reason: format!(
                    "unsupported format_version {} (expected {})",
                    self.format_version,
                    crate::MANIFEST_FORMAT_VERSION
                ),
            });
        }
        let mut seen = BTreeSet::new();
        let mut previous: Option<&str> = None;
        for resolved in &self.entries {
            resolved.check()?;
            let name = resolved.name();
            if !seen.insert(name) {
                return Err(Error::DuplicateEntry {
                    name: name.to_string(),
                });
            }
            if previous.is_some_and(|p| p > name) {
                return Err(Error::InvalidManifest {
                    reason: format!("entries are not sorted by name at '{name}'"),
                });
            }
            previous = Some(name);
        }
        Ok(())
    }

    /// The unpinned catalog view used by the gates and the sequencer.
    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::from_entries(self.entries.iter().map(|r| r.entry.clone()), self.summary)
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedCatalogEntry> {
        self.entries
            .binary_search_by(|r| r.entry.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Serialize as pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        ConfigStore::new()
            .render(Path::new(crate::MANIFEST_FILENAME), self)
            .map_err(Error::from)
    }

    /// Read and validate a manifest (format by extension).
    pub fn load(path: &Path) -> Result<Self> {
        let manifest: Self = ConfigStore::new().load(path)?;
        manifest.check()?;
        Ok(manifest)
    }

    /// Write the manifest atomically (format by extension).
    pub fn save(&self, path: &Path) -> Result<()> {
        ConfigStore::new().save(path, self)?;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "wrote manifest");
        Ok(())
    }
}
