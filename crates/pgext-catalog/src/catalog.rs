//! The loaded catalog: every entry keyed by its unique name.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use pgext_fs::ConfigStore;
use pgext_fs::config::Format;

use crate::entry::{CatalogEntry, Profile, SourceBucket};
use crate::error::{Error, Result};
use crate::schema::RawCatalog;

/// Counts the catalog author expects, checked by the pre-build gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<usize>,
}

/// Derived counts over the catalog.
///
/// Each field is computed with its own predicate so that the arithmetic
/// identities checked by [`CatalogStats::inconsistencies`] actually test the
/// categorization logic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total: usize,
    pub builtin: usize,
    pub package: usize,
    pub source: usize,
    pub enabled: usize,
    pub disabled: usize,
}

impl CatalogStats {
    pub fn from_entries<'a, I>(entries: I, profile: Profile) -> Self
    where
        I: IntoIterator<Item = &'a CatalogEntry>,
        I::IntoIter: Clone,
    {
        let entries = entries.into_iter();
        let count = |f: &dyn Fn(&CatalogEntry) -> bool| entries.clone().filter(|e| f(e)).count();
        Self {
            total: entries.clone().count(),
            builtin: count(&|e| e.bucket() == SourceBucket::Builtin),
            package: count(&|e| e.is_package_installed()),
            source: count(&|e| e.needs_build()),
            enabled: count(&|e| e.is_enabled(profile)),
            disabled: count(&|e| !e.is_enabled(profile)),
        }
    }

    /// Identities that must hold for any catalog, as human-readable violations.
    pub fn inconsistencies(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let by_bucket = self.builtin + self.package + self.source;
        if self.total != by_bucket {
            problems.push(format!(
                "total {} != builtin {} + package {} + source {} (= {})",
                self.total, self.builtin, self.package, self.source, by_bucket
            ));
        }
        let by_state = self.enabled + self.disabled;
        if self.total != by_state {
            problems.push(format!(
                "total {} != enabled {} + disabled {} (= {})",
                self.total, self.enabled, self.disabled, by_state
            ));
        }
        problems
    }

    /// Differences between these counts and the author's declared summary.
    pub fn mismatches(&self, summary: &CatalogSummary) -> Vec<String> {
        [
            ("total", summary.total, self.total),
            ("builtin", summary.builtin, self.builtin),
            ("package", summary.package, self.package),
            ("source", summary.source, self.source),
        ]
        .into_iter()
        .filter_map(|(label, declared, actual)| match declared {
            Some(declared) if declared != actual => Some(format!(
                "summary declares {declared} {label} entries but the catalog has {actual}"
            )),
            _ => None,
        })
        .collect()
    }
}

/// All catalog entries, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    summary: Option<CatalogSummary>,
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Build a catalog from typed entries, rejecting duplicates and entries
    /// that violate the schema.
    pub fn from_entries(
        entries: impl IntoIterator<Item = CatalogEntry>,
        summary: Option<CatalogSummary>,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            entry.check()?;
            if map.contains_key(&entry.name) {
                return Err(Error::DuplicateEntry { name: entry.name });
            }
            map.insert(entry.name.clone(), entry);
        }
        Ok(Self {
            summary,
            entries: map,
        })
    }

    /// Parse and validate a TOML catalog document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let store = ConfigStore::new();
        let raw: RawCatalog = store.parse(Path::new("<inline>"), Format::Toml, content)?;
        Self::from_raw(raw)
    }

    /// Load and validate a catalog file (TOML, JSON or YAML by extension).
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw: RawCatalog = ConfigStore::new().load(path)?;
        let catalog = Self::from_raw(raw)?;
        tracing::debug!(path = %path.display(), entries = catalog.len(), "loaded catalog");
        Ok(catalog)
    }

    fn from_raw(raw: RawCatalog) -> Result<Self> {
        let entries = raw
            .extensions
            .into_iter()
            .enumerate()
            .map(|(index, e)| e.into_entry(index))
            .collect::<Result<Vec<_>>>()?;
        Self::from_entries(entries, raw.summary)
    }

    pub fn summary(&self) -> Option<&CatalogSummary> {
        self.summary.as_ref()
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> + Clone {
        self.entries.values()
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Entries enabled under `profile`, in name order.
    pub fn enabled(&self, profile: Profile) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values().filter(move |e| e.is_enabled(profile))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<CatalogEntry> {
        self.entries.into_values().collect()
    }

    pub fn stats(&self, profile: Profile) -> CatalogStats {
        CatalogStats::from_entries(self.entries(), profile)
    }
}
