//! Gates over catalogs and descriptor files read from disk.

use assert_fs::prelude::*;
use pgext_catalog::{Catalog, Profile};
use pgext_gate::{DeclaredNames, GateKind, PostbuildGate, PrebuildGate};
use pretty_assertions::assert_eq;

const CATALOG: &str = r#"
[summary]
total = 4
builtin = 1
package = 0
source = 3

[[extension]]
name = "plpgsql"
kind = "builtin"
category = "language"
source = { type = "builtin" }
runtime = { enabled_by_default = true }

[[extension]]
name = "pg_cron"
category = "scheduling"
source = { type = "git-tag", repository = "https://github.com/citusdata/pg_cron.git", tag = "v1.6.4" }
build = { backend = "pgxs" }
runtime = { requires_preload = true, enabled_by_default = true }

[[extension]]
name = "vector"
display_name = "pgvector"
category = "search"
source = { type = "git-tag", repository = "https://github.com/pgvector/pgvector.git", tag = "v0.8.0" }
build = { backend = "pgxs" }
runtime = { enabled_by_default = true }

[[extension]]
name = "vectorscale"
category = "search"
source = { type = "git-tag", repository = "https://github.com/timescale/pgvectorscale.git", tag = "0.5.1" }
build = { backend = "pgrx", subdir = "pgvectorscale" }
dependencies = ["vector"]
enabled = false
disabled_reason = "waiting for pgrx 0.12"
"#;

fn entries() -> (Catalog, Vec<pgext_catalog::CatalogEntry>) {
    let catalog = Catalog::from_toml(CATALOG).unwrap();
    let entries = catalog.clone().into_entries();
    (catalog, entries)
}

#[test]
fn consistent_descriptors_pass() {
    let dir = assert_fs::TempDir::new().unwrap();
    let preload = dir.child("postgresql.conf");
    preload
        .write_str("shared_preload_libraries = 'pg_cron'\n")
        .unwrap();
    let bootstrap = dir.child("extensions.sql");
    bootstrap
        .write_str("CREATE EXTENSION IF NOT EXISTS pg_cron;\nCREATE EXTENSION IF NOT EXISTS vector;\n")
        .unwrap();

    let (catalog, entries) = entries();
    let report = PrebuildGate::new(Profile::Production)
        .with_preload(DeclaredNames::load_preload(preload.path()).unwrap())
        .with_bootstrap(DeclaredNames::load_bootstrap(bootstrap.path()).unwrap())
        .check(&entries, catalog.summary());
    assert!(report.is_success(), "{:?}", report.failures);
}

#[test]
fn preload_omission_is_one_failure_naming_the_entry() {
    let dir = assert_fs::TempDir::new().unwrap();
    let preload = dir.child("preload.list");
    preload.write_str("# nothing preloaded yet\n").unwrap();

    let (catalog, entries) = entries();
    let report = PrebuildGate::new(Profile::Production)
        .with_preload(DeclaredNames::load_preload(preload.path()).unwrap())
        .check(&entries, catalog.summary());

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].entry, "pg_cron");
    assert_eq!(report.failures[0].kind, GateKind::PreloadNotDeclared);
}

#[test]
fn full_suite_after_build() {
    let staging = assert_fs::TempDir::new().unwrap();
    staging.child("pg_cron/lib/pg_cron.so").write_str("elf").unwrap();
    staging.child("vector/lib/vector.so").write_str("elf").unwrap();
    staging
        .child("vectorscale/lib/vectorscale-0.5.1.so")
        .write_str("stale")
        .unwrap();

    let (catalog, entries) = entries();
    let report = PrebuildGate::new(Profile::Production)
        .check(&entries, catalog.summary())
        .merge(PostbuildGate::new(Profile::Production, staging.path()).check(&entries));

    let found: Vec<(&str, GateKind)> = report
        .failures
        .iter()
        .map(|f| (f.entry.as_str(), f.kind))
        .collect();
    assert_eq!(found, vec![("vectorscale", GateKind::StaleArtifacts)]);
}
