//! Catalog to staging tree, end to end
//!
//! Resolves a catalog against a real local upstream, writes the manifest,
//! builds it through the script backend and runs both validation gates.
#![cfg(unix)]

use std::process::Command;
use std::time::Duration;

use chrono::Utc;
use pgext_build::{BuildMode, DispatchOptions, Dispatcher, Scheduler};
use pgext_catalog::{BuildStatus, Catalog, CatalogEntry, Profile, ResolvedManifest};
use pgext_fs::BuildLayout;
use pgext_gate::{PostbuildGate, PrebuildGate};
use pgext_git::{Git2Remote, GitFetcher, ResolveOptions, Resolver, TrustPolicy};
use pgext_test_utils::git::UpstreamRepo;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const INSTALL_SCRIPT: &str = r#"set -e
mkdir -p "$PGEXT_INSTALL_DIR/lib"
cp version.txt "$PGEXT_INSTALL_DIR/lib/$PGEXT_ENTRY.so"
"#;

const DEPENDENT_SCRIPT: &str = r#"set -e
test -f "$PGEXT_STAGING_ROOT/base/lib/base.so"
mkdir -p "$PGEXT_INSTALL_DIR/lib"
cp version.txt "$PGEXT_INSTALL_DIR/lib/$PGEXT_ENTRY.so"
"#;

fn catalog_toml(url: &str) -> String {
    format!(
        r#"
[summary]
total = 3
builtin = 1
package = 0
source = 2

[[extension]]
name = "plpgsql"
kind = "builtin"
category = "language"
source = {{ type = "builtin" }}

[[extension]]
name = "base"
category = "test"
source = {{ type = "git-tag", repository = "{url}", tag = "v1.0" }}
build = {{ backend = "script", script = "install.sh" }}
runtime = {{ requires_preload = true, enabled_by_default = true }}

[[extension]]
name = "dependent"
category = "test"
source = {{ type = "git-tag", repository = "{url}", tag = "v1.0" }}
build = {{ backend = "script", script = "dependent.sh" }}
dependencies = ["base"]
"#
    )
}

struct Pipeline {
    upstream: UpstreamRepo,
    work: TempDir,
    layout: BuildLayout,
}

impl Pipeline {
    fn new() -> Self {
        let upstream = UpstreamRepo::new();
        upstream.commit_file("version.txt", "1.0\n", "Release 1.0");
        upstream.commit_script("install.sh", INSTALL_SCRIPT);
        upstream.commit_script("dependent.sh", DEPENDENT_SCRIPT);
        upstream.tag_annotated("v1.0");

        let work = TempDir::new().unwrap();
        let layout = BuildLayout::new(work.path().join("staging"), work.path().join("work"))
            .prepare()
            .unwrap();
        Self {
            upstream,
            work,
            layout,
        }
    }

    fn manifest_path(&self) -> std::path::PathBuf {
        self.work.path().join("extensions.lock.json")
    }

    async fn resolve(&self) -> ResolvedManifest {
        let catalog = Catalog::from_toml(&catalog_toml(&self.upstream.url())).unwrap();
        let resolver = Resolver::new(
            Git2Remote::new(Duration::from_secs(5)),
            TrustPolicy::local_only(),
            ResolveOptions {
                concurrency: 2,
                timeout: Duration::from_secs(30),
            },
        );
        let report = resolver
            .resolve_catalog(&catalog, &CancellationToken::new())
            .await;
        assert!(report.is_success(), "{:?}", report.failures);
        report
            .into_manifest(catalog.summary().copied(), Utc::now())
            .unwrap()
    }

    fn scheduler(&self) -> Scheduler<GitFetcher> {
        let options = DispatchOptions {
            jobs: 1,
            fetch_timeout: Duration::from_secs(60),
            backend_timeout: Duration::from_secs(60),
            ..DispatchOptions::default()
        };
        let dispatcher = Dispatcher::new(
            GitFetcher,
            TrustPolicy::local_only(),
            self.layout.clone(),
            options,
        );
        Scheduler::new(dispatcher, 2, BuildMode::FailFast)
    }

    /// Move `v1.0` to a new commit, as an upstream re-tag would.
    fn retag(&self) -> String {
        let commit = self
            .upstream
            .commit_file("version.txt", "1.0-retagged\n", "Rewrite history");
        let status = Command::new("git")
            .args(["tag", "-f", "v1.0"])
            .current_dir(self.upstream.path())
            .output()
            .unwrap()
            .status;
        assert!(status.success());
        commit
    }
}

fn entries(manifest: &ResolvedManifest) -> Vec<CatalogEntry> {
    manifest.entries.iter().map(|r| r.entry.clone()).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_build_and_validate() {
    let pipeline = Pipeline::new();
    let head = pipeline.upstream.head();

    let manifest = pipeline.resolve().await;
    manifest.save(&pipeline.manifest_path()).unwrap();
    assert_eq!(manifest.get("base").unwrap().commit(), Some(head.as_str()));
    assert_eq!(manifest.get("plpgsql").unwrap().commit(), None);

    let manifest = ResolvedManifest::load(&pipeline.manifest_path()).unwrap();
    let entries = entries(&manifest);
    let prebuild = PrebuildGate::new(Profile::Production).check(&entries, manifest.summary.as_ref());
    assert!(prebuild.is_success(), "{:?}", prebuild.failures);

    let started = Utc::now();
    let report = pipeline
        .scheduler()
        .run(&manifest, Profile::Production, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
    let built: Vec<&str> = report.built.iter().map(|o| o.entry.as_str()).collect();
    assert_eq!(built, vec!["base", "dependent"]);

    let metadata = report.metadata(&manifest, Profile::Production, started, Utc::now());
    let statuses: Vec<(&str, BuildStatus)> = metadata
        .entries
        .iter()
        .map(|r| (r.name.as_str(), r.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("base", BuildStatus::Built),
            ("dependent", BuildStatus::Built),
            ("plpgsql", BuildStatus::Skipped),
        ]
    );
    let base = &metadata.entries[0];
    assert_eq!(base.artifacts.len(), 1);
    assert!(base.artifacts[0].checksum.starts_with("sha256:"));

    let postbuild =
        PostbuildGate::new(Profile::Production, pipeline.layout.staging_root()).check(&entries);
    assert!(postbuild.is_success(), "{:?}", postbuild.failures);
}

#[tokio::test(flavor = "multi_thread")]
async fn manifest_keeps_building_the_resolved_commit_after_retag() {
    let pipeline = Pipeline::new();
    let original = pipeline.upstream.head();
    pipeline.resolve().await.save(&pipeline.manifest_path()).unwrap();

    let moved = pipeline.retag();
    assert_ne!(moved, original);

    let manifest = ResolvedManifest::load(&pipeline.manifest_path()).unwrap();
    assert_eq!(manifest.get("base").unwrap().commit(), Some(original.as_str()));

    let report = pipeline
        .scheduler()
        .run(&manifest, Profile::Production, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report.failures);

    let library = pipeline.layout.staging_root().join("base/lib/base.so");
    assert_eq!(std::fs::read_to_string(library).unwrap(), "1.0\n");

    let fresh = pipeline.resolve().await;
    assert_eq!(fresh.get("base").unwrap().commit(), Some(moved.as_str()));
}
