//! Artifact presence checks against the staging tree.

use std::path::{Path, PathBuf};

use pgext_catalog::{CatalogEntry, Profile};
use pgext_fs::io::is_missing_or_empty;
use pgext_fs::validate_entry_dir_name;

use crate::report::{GateFailure, GateKind, GatePass, GateReport};

const LIBRARY_SUFFIXES: &[&str] = &["so", "dylib", "dll"];

/// The post-build gate over `{staging_root}/{name}/` directories.
#[derive(Debug, Clone)]
pub struct PostbuildGate {
    profile: Profile,
    staging_root: PathBuf,
}

impl PostbuildGate {
    pub fn new(profile: Profile, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            profile,
            staging_root: staging_root.into(),
        }
    }

    /// Run every check and accumulate the findings.
    pub fn check(&self, entries: &[CatalogEntry]) -> GateReport {
        let mut report = GateReport::new(GatePass::Postbuild);
        for entry in entries {
            if let Err(e) = validate_entry_dir_name(&entry.name) {
                report.push(GateFailure::new(
                    entry.name.clone(),
                    GateKind::MissingArtifacts,
                    e.to_string(),
                ));
                continue;
            }
            let dir = self.staging_root.join(&entry.name);
            let empty = match is_missing_or_empty(&dir) {
                Ok(empty) => empty,
                Err(e) => {
                    report.push(GateFailure::new(
                        entry.name.clone(),
                        GateKind::MissingArtifacts,
                        e.to_string(),
                    ));
                    continue;
                }
            };

            if !entry.is_enabled(self.profile) {
                if !empty {
                    report.push(GateFailure::new(
                        entry.name.clone(),
                        GateKind::StaleArtifacts,
                        format!("disabled but {} is not empty", dir.display()),
                    ));
                }
                continue;
            }
            if !entry.needs_build() {
                continue;
            }
            if empty {
                report.push(GateFailure::new(
                    entry.name.clone(),
                    GateKind::MissingArtifacts,
                    format!("enabled but {} is missing or empty", dir.display()),
                ));
                continue;
            }
            if let Some(library) = entry.runtime.preload_library_name.as_deref()
                && !has_library(&dir, library)
            {
                report.push(GateFailure::new(
                    entry.name.clone(),
                    GateKind::MissingPreloadLibrary,
                    format!("no lib/{library}.{{so,dylib,dll}} in {}", dir.display()),
                ));
            }
        }

        tracing::info!(
            entries = entries.len(),
            failures = report.failures.len(),
            "post-build gate finished"
        );
        report
    }
}

fn has_library(staging_dir: &Path, library: &str) -> bool {
    LIBRARY_SUFFIXES
        .iter()
        .any(|ext| staging_dir.join("lib").join(format!("{library}.{ext}")).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use pgext_test_utils::catalog::EntryBuilder;
    use pretty_assertions::assert_eq;

    const REPO: &str = "https://github.com/example/ext.git";

    fn kinds(report: &GateReport) -> Vec<(&str, GateKind)> {
        report
            .failures
            .iter()
            .map(|f| (f.entry.as_str(), f.kind))
            .collect()
    }

    #[test]
    fn test_built_entries_pass() {
        let staging = assert_fs::TempDir::new().unwrap();
        staging.child("vector/lib/vector.so").write_str("elf").unwrap();
        staging.child("timescaledb/lib/timescaledb-2.17.so").write_str("elf").unwrap();
        staging.child("timescaledb/lib/timescaledb.so").write_str("elf").unwrap();

        let entries = vec![
            EntryBuilder::git_tag("vector", REPO, "v0.8.0").build(),
            EntryBuilder::git_tag("timescaledb", REPO, "2.17.0")
                .preload()
                .preload_library("timescaledb")
                .build(),
            EntryBuilder::builtin("plpgsql").build(),
            EntryBuilder::git_tag("postgis", REPO, "3.5.0")
                .install_via("postgresql-17-postgis-3")
                .build(),
        ];
        let report = PostbuildGate::new(Profile::Production, staging.path()).check(&entries);
        assert!(report.is_success(), "{:?}", report.failures);
    }

    #[test]
    fn test_missing_stale_and_preload_library() {
        let staging = assert_fs::TempDir::new().unwrap();
        staging.child("empty").create_dir_all().unwrap();
        staging.child("retired/lib/retired.so").write_str("old").unwrap();
        staging.child("pg_cron/extension/pg_cron.control").write_str("").unwrap();

        let entries = vec![
            EntryBuilder::git_tag("absent", REPO, "v1").build(),
            EntryBuilder::git_tag("empty", REPO, "v1").build(),
            EntryBuilder::git_tag("pg_cron", REPO, "v1.6.4")
                .preload()
                .preload_library("pg_cron")
                .build(),
            EntryBuilder::git_tag("retired", REPO, "v1")
                .disabled("superseded")
                .build(),
            EntryBuilder::git_tag("shelved", REPO, "v1")
                .disabled("not ready")
                .build(),
        ];
        let report = PostbuildGate::new(Profile::Production, staging.path()).check(&entries);
        assert_eq!(
            kinds(&report),
            vec![
                ("absent", GateKind::MissingArtifacts),
                ("empty", GateKind::MissingArtifacts),
                ("pg_cron", GateKind::MissingPreloadLibrary),
                ("retired", GateKind::StaleArtifacts),
            ]
        );
    }

    #[test]
    fn test_preload_library_matches_any_platform_suffix() {
        let staging = assert_fs::TempDir::new().unwrap();
        staging.child("pg_cron/lib/pg_cron.dylib").write_str("macho").unwrap();
        staging.child("auto_cron/lib/cron.so").write_str("elf").unwrap();

        assert!(has_library(&staging.path().join("pg_cron"), "pg_cron"));
        assert!(!has_library(&staging.path().join("pg_cron"), "cron"));
        assert!(!has_library(&staging.path().join("auto_cron"), "auto_cron"));
    }

    #[test]
    fn test_regression_profile_expects_artifacts() {
        let staging = assert_fs::TempDir::new().unwrap();
        let entries = vec![
            EntryBuilder::git_tag("experimental", REPO, "v1")
                .disabled("flaky")
                .enabled_in_regression()
                .build(),
        ];
        let production = PostbuildGate::new(Profile::Production, staging.path()).check(&entries);
        assert!(production.is_success());
        let regression = PostbuildGate::new(Profile::Regression, staging.path()).check(&entries);
        assert_eq!(
            kinds(&regression),
            vec![("experimental", GateKind::MissingArtifacts)]
        );
    }
}
