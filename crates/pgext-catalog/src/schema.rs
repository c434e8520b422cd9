//! Catalog document schema.
//!
//! Authored catalogs are first deserialized into permissive `Raw*` shapes
//! where every field is optional, then converted into typed
//! [`CatalogEntry`] values. Doing the presence checks here, instead of
//! relying on serde's "missing field" errors, lets every rejection name the
//! offending entry and field.
//!
//! # Example TOML
//!
//! ```toml
//! [[extension]]
//! name = "vector"
//! kind = "extension"
//! category = "search"
//! source = { type = "git-tag", repository = "https://github.com/pgvector/pgvector.git", tag = "v0.8.0" }
//! build = { backend = "pgxs" }
//! runtime = { enabled_by_default = true }
//! ```

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::catalog::CatalogSummary;
use crate::entry::{Backend, BuildSpec, CatalogEntry, EntryKind, RuntimeSpec, Source};
use crate::error::{Error, Result};

/// Top-level catalog document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCatalog {
    #[serde(default)]
    pub summary: Option<CatalogSummary>,
    #[serde(default, rename = "extension")]
    pub extensions: Vec<RawEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEntry {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub source: Option<RawSource>,
    pub build: Option<RawBuild>,
    pub runtime: Option<RuntimeSpec>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub install_via: Option<String>,
    pub enabled: Option<bool>,
    pub disabled_reason: Option<String>,
    #[serde(default)]
    pub enabled_in_regression: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSource {
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    pub repository: Option<String>,
    pub tag: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBuild {
    pub backend: Option<String>,
    pub script: Option<String>,
    pub subdir: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub disable_default_features: bool,
    #[serde(default)]
    pub patches: Vec<String>,
}

fn required(entry: &str, field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(Error::schema(entry, field, "must not be empty")),
        None => Err(Error::schema(entry, field, "is required")),
    }
}

impl RawSource {
    fn into_source(self, entry: &str) -> Result<Source> {
        let source_type = required(entry, "source.type", self.source_type)?;
        match source_type.as_str() {
            "builtin" => Ok(Source::Builtin),
            "git-tag" => Ok(Source::GitTag {
                repository: required(entry, "source.repository", self.repository)?,
                tag: required(entry, "source.tag", self.tag)?,
            }),
            "git-ref" => Ok(Source::GitRef {
                repository: required(entry, "source.repository", self.repository)?,
                git_ref: required(entry, "source.ref", self.git_ref)?,
            }),
            other => Err(Error::schema(
                entry,
                "source.type",
                format!("unknown source type '{other}' (expected builtin, git-tag or git-ref)"),
            )),
        }
    }
}

impl RawBuild {
    fn into_build(self, entry: &str) -> Result<BuildSpec> {
        let backend_name = required(entry, "build.backend", self.backend)?;
        let backend = Backend::parse(&backend_name, self.script.as_deref()).map_err(|reason| {
            let field = if backend_name == "script" {
                "build.script"
            } else {
                "build.backend"
            };
            Error::schema(entry, field, reason)
        })?;
        Ok(BuildSpec {
            backend,
            subdir: self.subdir,
            features: self.features,
            disable_default_features: self.disable_default_features,
            patches: self.patches,
        })
    }
}

impl RawEntry {
    /// Convert into a typed entry. `index` labels entries that have no name.
    pub fn into_entry(self, index: usize) -> Result<CatalogEntry> {
        let label = self
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("#{index}"));
        let name = required(&label, "name", self.name)?;

        let kind = match self.kind {
            Some(k) => k
                .parse::<EntryKind>()
                .map_err(|reason| Error::schema(&name, "kind", reason))?,
            None => EntryKind::Extension,
        };
        let category = required(&name, "category", self.category)?;
        let source = self
            .source
            .ok_or_else(|| Error::schema(&name, "source", "is required"))?
            .into_source(&name)?;
        let build = self.build.map(|b| b.into_build(&name)).transpose()?;

        let mut dependencies = BTreeSet::new();
        for dep in self.dependencies {
            if dep.trim().is_empty() {
                return Err(Error::schema(&name, "dependencies", "names must not be empty"));
            }
            if !dependencies.insert(dep.clone()) {
                return Err(Error::schema(
                    &name,
                    "dependencies",
                    format!("'{dep}' is listed more than once"),
                ));
            }
        }

        let entry = CatalogEntry {
            name,
            display_name: self.display_name,
            kind,
            category,
            source,
            build,
            runtime: self.runtime.unwrap_or_default(),
            dependencies,
            install_via: self.install_via.filter(|v| !v.trim().is_empty()),
            enabled: self.enabled.unwrap_or(true),
            disabled_reason: self.disabled_reason,
            enabled_in_regression: self.enabled_in_regression,
        };
        entry.check()?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_one(toml_str: &str) -> Result<CatalogEntry> {
        let raw: RawCatalog = toml::from_str(toml_str).unwrap();
        raw.extensions.into_iter().next().unwrap().into_entry(0)
    }

    fn schema_field(err: Error) -> (String, String) {
        match err {
            Error::Schema { entry, field, .. } => (entry, field),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_full_entry() {
        let entry = parse_one(
            r#"
[[extension]]
name = "vectorscale"
display_name = "pgvectorscale"
kind = "extension"
category = "search"
source = { type = "git-tag", repository = "https://github.com/timescale/pgvectorscale.git", tag = "0.5.1" }
build = { backend = "pgrx", subdir = "pgvectorscale", features = ["pg17"], disable_default_features = true }
runtime = { enabled_by_default = true }
dependencies = ["vector"]
"#,
        )
        .unwrap();

        assert_eq!(entry.name, "vectorscale");
        assert_eq!(entry.display_name.as_deref(), Some("pgvectorscale"));
        assert_eq!(
            entry.source,
            Source::GitTag {
                repository: "https://github.com/timescale/pgvectorscale.git".into(),
                tag: "0.5.1".into()
            }
        );
        let build = entry.build.as_ref().unwrap();
        assert_eq!(build.backend, Backend::Pgrx);
        assert_eq!(build.subdir.as_deref(), Some("pgvectorscale"));
        assert_eq!(build.features, vec!["pg17".to_string()]);
        assert!(build.disable_default_features);
        assert!(entry.runtime.enabled_by_default);
        assert!(entry.dependencies.contains("vector"));
        assert!(entry.enabled);
    }

    #[test]
    fn test_git_tag_missing_tag() {
        let err = parse_one(
            r#"
[[extension]]
name = "pg_cron"
category = "scheduling"
source = { type = "git-tag", repository = "https://github.com/citusdata/pg_cron.git" }
build = { backend = "pgxs" }
"#,
        )
        .unwrap_err();
        assert_eq!(schema_field(err), ("pg_cron".into(), "source.tag".into()));
    }

    #[test]
    fn test_git_ref_missing_ref() {
        let err = parse_one(
            r#"
[[extension]]
name = "hypopg"
category = "tuning"
source = { type = "git-ref", repository = "https://github.com/HypoPG/hypopg.git" }
build = { backend = "pgxs" }
"#,
        )
        .unwrap_err();
        assert_eq!(schema_field(err), ("hypopg".into(), "source.ref".into()));
    }

    #[test]
    fn test_non_builtin_missing_build() {
        let err = parse_one(
            r#"
[[extension]]
name = "pgaudit"
category = "security"
source = { type = "git-tag", repository = "https://github.com/pgaudit/pgaudit.git", tag = "17.0" }
"#,
        )
        .unwrap_err();
        assert_eq!(schema_field(err), ("pgaudit".into(), "build".into()));
    }

    #[test]
    fn test_disabled_missing_reason() {
        let err = parse_one(
            r#"
[[extension]]
name = "pg_hint_plan"
category = "tuning"
source = { type = "builtin" }
kind = "builtin"
enabled = false
"#,
        )
        .unwrap_err();
        assert_eq!(schema_field(err), ("pg_hint_plan".into(), "disabled_reason".into()));
    }

    #[test]
    fn test_unnamed_entry_labelled_by_index() {
        let raw: RawCatalog = toml::from_str(
            r#"
[[extension]]
category = "search"
source = { type = "builtin" }
"#,
        )
        .unwrap();
        let err = raw.extensions.into_iter().next().unwrap().into_entry(3).unwrap_err();
        assert_eq!(schema_field(err), ("#3".into(), "name".into()));
    }

    #[test]
    fn test_unknown_backend() {
        let err = parse_one(
            r#"
[[extension]]
name = "odd"
category = "misc"
source = { type = "git-ref", repository = "https://github.com/x/odd.git", ref = "abc123" }
build = { backend = "bazel" }
"#,
        )
        .unwrap_err();
        assert_eq!(schema_field(err), ("odd".into(), "build.backend".into()));
    }

    #[test]
    fn test_script_backend_without_script() {
        let err = parse_one(
            r#"
[[extension]]
name = "pgsodium"
category = "security"
source = { type = "git-ref", repository = "https://github.com/michelp/pgsodium.git", ref = "abc123" }
build = { backend = "script" }
"#,
        )
        .unwrap_err();
        assert_eq!(schema_field(err), ("pgsodium".into(), "build.script".into()));
    }

    #[test]
    fn test_unknown_source_type() {
        let err = parse_one(
            r#"
[[extension]]
name = "x"
category = "misc"
source = { type = "tarball" }
"#,
        )
        .unwrap_err();
        assert_eq!(schema_field(err), ("x".into(), "source.type".into()));
    }

    #[test]
    fn test_duplicate_dependency_rejected() {
        let err = parse_one(
            r#"
[[extension]]
name = "vectorscale"
category = "search"
source = { type = "git-ref", repository = "https://github.com/x/y.git", ref = "abc" }
build = { backend = "pgrx" }
dependencies = ["vector", "vector"]
"#,
        )
        .unwrap_err();
        assert_eq!(schema_field(err), ("vectorscale".into(), "dependencies".into()));
    }

    #[test]
    fn test_defaults() {
        let entry = parse_one(
            r#"
[[extension]]
name = "plpgsql"
kind = "builtin"
category = "language"
source = { type = "builtin" }
"#,
        )
        .unwrap();
        assert!(entry.enabled);
        assert!(entry.build.is_none());
        assert_eq!(entry.runtime, RuntimeSpec::default());
        assert!(!entry.enabled_in_regression);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<RawCatalog, _> = toml::from_str(
            r#"
[[extension]]
name = "x"
buildd = { backend = "pgxs" }
"#,
        );
        assert!(result.is_err());
    }
}
