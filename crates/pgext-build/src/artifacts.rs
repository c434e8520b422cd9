//! Artifact collection from an install tree into the staging directory.
//!
//! ```text
//! {staging_root}/{name}/lib/          shared libraries (.so .dylib .dll)
//! {staging_root}/{name}/extension/    control and SQL files
//! {staging_root}/{name}/bin/          executables from any bin/ directory
//! {staging_root}/{name}/include/      headers below any include/ directory
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use pgext_catalog::ArtifactRecord;
use pgext_fs::checksum::compute_file_checksum;
use walkdir::WalkDir;

use crate::error::BuildErrorKind;

const LIBRARY_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];
const EXTENSION_FILE_EXTENSIONS: &[&str] = &["control", "sql"];

/// Staging-relative destination for an installed file, or `None` when the
/// file is not part of the shipped artifact set.
pub fn classify(relative: &Path) -> Option<PathBuf> {
    let file_name = relative.file_name()?;
    let extension = relative.extension().and_then(|e| e.to_str()).unwrap_or("");
    if LIBRARY_EXTENSIONS.contains(&extension) {
        return Some(Path::new("lib").join(file_name));
    }
    if EXTENSION_FILE_EXTENSIONS.contains(&extension) {
        return Some(Path::new("extension").join(file_name));
    }

    let components: Vec<&str> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let parent = &components[..components.len().saturating_sub(1)];
    if parent.last() == Some(&"bin") {
        return Some(Path::new("bin").join(file_name));
    }
    if let Some(idx) = parent.iter().position(|c| *c == "include") {
        let below: PathBuf = components[idx + 1..].iter().collect();
        return Some(Path::new("include").join(below));
    }
    None
}

fn relative_display(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Copy the shippable files from `install_dir` into a fresh `staging_dir`.
///
/// Records are sorted by path. When two installed files map to the same
/// destination the first in walk order wins.
pub fn collect(install_dir: &Path, staging_dir: &Path) -> Result<Vec<ArtifactRecord>, BuildErrorKind> {
    let failure = |reason: String| BuildErrorKind::ArtifactCollection { reason };

    if !install_dir.is_dir() {
        return Err(failure(format!(
            "install directory {} does not exist",
            install_dir.display()
        )));
    }
    pgext_fs::io::remove_dir_if_exists(staging_dir).map_err(|e| failure(e.to_string()))?;

    let mut records = Vec::new();
    for item in WalkDir::new(install_dir).sort_by_file_name() {
        let item = item.map_err(|e| failure(format!("cannot walk install tree: {e}")))?;
        if !item.file_type().is_file() {
            continue;
        }
        let relative = item
            .path()
            .strip_prefix(install_dir)
            .map_err(|e| failure(e.to_string()))?;
        let Some(destination) = classify(relative) else {
            continue;
        };
        let target = staging_dir.join(&destination);
        if target.exists() {
            tracing::warn!(
                source = %item.path().display(),
                destination = %destination.display(),
                "duplicate artifact ignored"
            );
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| failure(format!("cannot create {}: {e}", parent.display())))?;
        }
        fs::copy(item.path(), &target).map_err(|e| {
            failure(format!(
                "cannot copy {} to {}: {e}",
                item.path().display(),
                target.display()
            ))
        })?;
        let checksum = compute_file_checksum(&target).map_err(|e| failure(e.to_string()))?;
        records.push(ArtifactRecord {
            path: relative_display(&destination),
            checksum,
        });
    }

    if records.is_empty() {
        return Err(failure(format!(
            "backend succeeded but installed no libraries, extension files, binaries or headers under {}",
            install_dir.display()
        )));
    }
    records.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("usr/lib/postgresql/17/lib/vector.so", Some("lib/vector.so"))]
    #[case("usr/share/postgresql/17/extension/vector.control", Some("extension/vector.control"))]
    #[case("usr/share/postgresql/17/extension/vector--0.8.0.sql", Some("extension/vector--0.8.0.sql"))]
    #[case("usr/bin/pg_repack", Some("bin/pg_repack"))]
    #[case("usr/include/postgresql/server/extension/vector/vector.h", Some("include/postgresql/server/extension/vector/vector.h"))]
    #[case("usr/share/doc/vector/README.md", None)]
    #[case("usr/lib/postgresql/17/lib/bitcode/vector/src/vector.bc", None)]
    fn test_classify(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(classify(Path::new(path)), expected.map(PathBuf::from));
    }

    #[test]
    fn test_collect_copies_and_checksums() {
        let install = assert_fs::TempDir::new().unwrap();
        let staging = assert_fs::TempDir::new().unwrap();
        install.child("usr/lib/pg_cron.so").write_binary(b"\x7fELF").unwrap();
        install.child("usr/share/extension/pg_cron.control").write_str("comment = 'cron'\n").unwrap();
        install.child("usr/share/doc/README").write_str("docs").unwrap();

        let dest = staging.child("pg_cron");
        let records = collect(install.path(), dest.path()).unwrap();

        let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["extension/pg_cron.control", "lib/pg_cron.so"]);
        assert!(records.iter().all(|r| r.checksum.starts_with("sha256:")));
        dest.child("lib/pg_cron.so").assert(predicate::path::is_file());
        dest.child("README").assert(predicate::path::missing());
    }

    #[test]
    fn test_collect_replaces_stale_staging() {
        let install = assert_fs::TempDir::new().unwrap();
        let staging = assert_fs::TempDir::new().unwrap();
        install.child("lib/new.so").write_str("new").unwrap();
        staging.child("demo/lib/old.so").write_str("old").unwrap();

        collect(install.path(), &staging.path().join("demo")).unwrap();
        staging.child("demo/lib/old.so").assert(predicate::path::missing());
        staging.child("demo/lib/new.so").assert(predicate::path::is_file());
    }

    #[test]
    fn test_empty_install_is_collection_error() {
        let install = assert_fs::TempDir::new().unwrap();
        install.child("share/doc/README").write_str("only docs").unwrap();
        let staging = assert_fs::TempDir::new().unwrap();

        let err = collect(install.path(), &staging.path().join("demo")).unwrap_err();
        assert!(matches!(err, BuildErrorKind::ArtifactCollection { .. }));
    }

    #[test]
    fn test_missing_install_dir() {
        let staging = assert_fs::TempDir::new().unwrap();
        let err = collect(&staging.path().join("nope"), &staging.path().join("demo")).unwrap_err();
        assert!(matches!(err, BuildErrorKind::ArtifactCollection { .. }));
    }
}
