//! Adapters over the external descriptors the catalog is checked against.
//!
//! Neither descriptor is owned here. Each adapter only extracts the set of
//! names a file declares:
//!
//! - preload: a plain list (one per line or comma-separated), or one or
//!   more `shared_preload_libraries = '...'` assignments, in which case only
//!   the assigned values count
//! - bootstrap: `CREATE EXTENSION [IF NOT EXISTS] name` statements, or a
//!   plain list when the file has none

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

static PRELOAD_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)shared_preload_libraries\s*=\s*(?P<value>'[^']*'|"[^"]*"|[^\s#]+)"#)
        .unwrap_or_else(|e| panic!("preload pattern: {e}"))
});

static CREATE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bcreate\s+extension\s+(?:if\s+not\s+exists\s+)?(?:"(?P<quoted>[^"]+)"|(?P<bare>[a-z_][a-z0-9_\-]*))"#,
    )
    .unwrap_or_else(|e| panic!("bootstrap pattern: {e}"))
});

/// A set of names declared by an external descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeclaredNames(BTreeSet<String>);

fn strip_comment<'a>(line: &'a str, markers: &[&str]) -> &'a str {
    markers
        .iter()
        .filter_map(|m| line.find(m))
        .min()
        .map_or(line, |idx| &line[..idx])
}

fn split_names(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|t| t.trim_matches(|c| c == '\'' || c == '"' || c == ';'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

impl DeclaredNames {
    /// Names from a preload descriptor.
    pub fn parse_preload(content: &str) -> Self {
        let lines: Vec<&str> = content.lines().map(|l| strip_comment(l, &["#"])).collect();

        let assigned: Vec<&str> = lines
            .iter()
            .flat_map(|line| PRELOAD_ASSIGNMENT.captures_iter(line))
            .filter_map(|caps| caps.name("value").map(|m| m.as_str()))
            .collect();

        if assigned.is_empty() {
            lines.iter().flat_map(|l| split_names(l)).collect()
        } else {
            assigned.into_iter().flat_map(split_names).collect()
        }
    }

    /// Names from a bootstrap descriptor. Unquoted identifiers fold to
    /// lower case.
    pub fn parse_bootstrap(content: &str) -> Self {
        let lines: Vec<&str> = content
            .lines()
            .map(|l| strip_comment(l, &["--", "#"]))
            .collect();
        let sql = lines.join("\n");

        let activated: Self = CREATE_EXTENSION
            .captures_iter(&sql)
            .filter_map(|caps| {
                caps.name("quoted")
                    .map(|m| m.as_str().to_string())
                    .or_else(|| caps.name("bare").map(|m| m.as_str().to_ascii_lowercase()))
            })
            .collect();

        if activated.is_empty() {
            lines.iter().flat_map(|l| split_names(l)).collect()
        } else {
            activated
        }
    }

    pub fn load_preload(path: &Path) -> Result<Self> {
        let content = pgext_fs::io::read_text(path).map_err(|source| Error::Descriptor {
            kind: "preload",
            source,
        })?;
        let names = Self::parse_preload(&content);
        tracing::debug!(path = %path.display(), names = names.len(), "read preload descriptor");
        Ok(names)
    }

    pub fn load_bootstrap(path: &Path) -> Result<Self> {
        let content = pgext_fs::io::read_text(path).map_err(|source| Error::Descriptor {
            kind: "bootstrap",
            source,
        })?;
        let names = Self::parse_bootstrap(&content);
        tracing::debug!(path = %path.display(), names = names.len(), "read bootstrap descriptor");
        Ok(names)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for DeclaredNames {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for DeclaredNames {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn names(set: &DeclaredNames) -> Vec<&str> {
        set.iter().collect()
    }

    #[rstest]
    #[case::one_per_line("pg_cron\npg_stat_statements\n", &["pg_cron", "pg_stat_statements"])]
    #[case::comma_list("pg_cron, timescaledb,auto_explain", &["auto_explain", "pg_cron", "timescaledb"])]
    #[case::comments("# loaded at start\npg_cron # scheduler\n\n", &["pg_cron"])]
    #[case::assignment(
        "max_connections = 100\nshared_preload_libraries = 'pg_cron,pg_stat_statements' # hooks\n",
        &["pg_cron", "pg_stat_statements"]
    )]
    #[case::shell_flag(
        "exec postgres -c shared_preload_libraries=\"timescaledb,pg_cron\" \"$@\"\n",
        &["pg_cron", "timescaledb"]
    )]
    #[case::empty("", &[])]
    fn test_parse_preload(#[case] content: &str, #[case] expected: &[&str]) {
        assert_eq!(names(&DeclaredNames::parse_preload(content)), expected);
    }

    #[rstest]
    #[case::statements(
        "CREATE EXTENSION IF NOT EXISTS vector;\ncreate extension pg_cron;\n",
        &["pg_cron", "vector"]
    )]
    #[case::quoted("CREATE EXTENSION \"uuid-ossp\";\nCREATE EXTENSION PostGIS;", &["postgis", "uuid-ossp"])]
    #[case::comments_ignored("-- CREATE EXTENSION skipped;\nCREATE EXTENSION age;", &["age"])]
    #[case::plain_list("vector\npg_cron\n", &["pg_cron", "vector"])]
    fn test_parse_bootstrap(#[case] content: &str, #[case] expected: &[&str]) {
        assert_eq!(names(&DeclaredNames::parse_bootstrap(content)), expected);
    }

    #[test]
    fn test_multiline_statement() {
        let sql = "CREATE EXTENSION\n    IF NOT EXISTS\n    timescaledb\n    CASCADE;";
        assert!(DeclaredNames::parse_bootstrap(sql).contains("timescaledb"));
    }

    #[test]
    fn test_missing_descriptor_names_kind() {
        let dir = tempfile::tempdir().unwrap();
        let err = DeclaredNames::load_preload(&dir.path().join("preload.list")).unwrap_err();
        assert!(err.to_string().starts_with("cannot read preload descriptor"));
    }
}
