//! Per-entry build pipeline: trust check, fetch, patch, backend, collect.

use std::path::PathBuf;
use std::time::Duration;

use pgext_catalog::{ArtifactRecord, ResolvedCatalogEntry};
use pgext_fs::BuildLayout;
use pgext_git::fetch::build_root;
use pgext_git::{Interrupt, SourceFetcher, TrustPolicy};
use tokio_util::sync::CancellationToken;

use crate::artifacts;
use crate::backend::{BackendContext, strategy};
use crate::error::{BuildErrorKind, BuildFailure};
use crate::patch;
use crate::runner::StepRunner;

/// Tunables for every dispatched build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    pub pg_config: String,
    /// Parallel jobs handed to each backend.
    pub jobs: usize,
    pub fetch_timeout: Duration,
    pub backend_timeout: Duration,
    /// Captured log lines attached to backend failures.
    pub log_tail_lines: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            pg_config: "pg_config".to_string(),
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            fetch_timeout: Duration::from_secs(300),
            backend_timeout: Duration::from_secs(1800),
            log_tail_lines: 40,
        }
    }
}

/// A successfully built entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub entry: String,
    pub staging_dir: PathBuf,
    pub artifacts: Vec<ArtifactRecord>,
}

/// Builds one resolved entry into its staging directory.
pub struct Dispatcher<F> {
    fetcher: F,
    policy: TrustPolicy,
    layout: BuildLayout,
    options: DispatchOptions,
}

impl<F: SourceFetcher> Dispatcher<F> {
    /// `layout` should already be prepared (absolute, existing roots).
    pub fn new(fetcher: F, policy: TrustPolicy, layout: BuildLayout, options: DispatchOptions) -> Self {
        Self {
            fetcher,
            policy,
            layout,
            options,
        }
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Run the full pipeline for `resolved`.
    pub async fn build(
        &self,
        resolved: &ResolvedCatalogEntry,
        cancel: &CancellationToken,
    ) -> Result<BuildOutput, BuildFailure> {
        let name = resolved.name().to_string();
        let fail = |kind: BuildErrorKind| BuildFailure::new(name.clone(), kind);
        let entry = &resolved.entry;

        let Some(pinned) = resolved.pinned.as_ref() else {
            return Err(fail(BuildErrorKind::Fetch {
                reason: "entry has no pinned source to fetch".to_string(),
            }));
        };
        let Some(build) = entry.build.as_ref() else {
            return Err(fail(BuildErrorKind::Fetch {
                reason: "entry has no build section".to_string(),
            }));
        };

        // Fail closed before touching the network or the work tree
        self.policy
            .check(&pinned.repository)
            .map_err(|e| fail(BuildErrorKind::UntrustedSource { reason: e.to_string() }))?;

        let fs_failure = |e: pgext_fs::Error| {
            fail(BuildErrorKind::Fetch {
                reason: format!("cannot prepare work directories: {e}"),
            })
        };
        self.layout.reset_entry(&name).map_err(fs_failure)?;
        let source_dir = self.layout.source_dir(&name).map_err(fs_failure)?;
        let install_dir = self.layout.install_dir(&name).map_err(fs_failure)?;
        let staging_dir = self.layout.staging_dir(&name).map_err(fs_failure)?;
        let log_path = self.layout.log_path(&name).map_err(fs_failure)?;
        // Each attempt starts a fresh log
        match std::fs::remove_file(&log_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(fs_failure(pgext_fs::Error::io(&log_path, e))),
        }

        tracing::info!(entry = %name, commit = %pinned.commit, "fetching source");
        let fetch_timeout = self.options.fetch_timeout;
        let timed_out = || fail(BuildErrorKind::FetchTimeout { seconds: fetch_timeout.as_secs() });
        let interrupt = Interrupt::within(cancel, fetch_timeout);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(fail(BuildErrorKind::Cancelled)),
            fetched = tokio::time::timeout(fetch_timeout, self.fetcher.fetch(pinned, &source_dir, &interrupt)) => {
                match fetched {
                    Ok(Ok(())) => {}
                    Ok(Err(pgext_git::Error::Cancelled)) => return Err(fail(BuildErrorKind::Cancelled)),
                    Ok(Err(pgext_git::Error::DeadlineExceeded)) | Err(_) => return Err(timed_out()),
                    Ok(Err(e)) => return Err(fail(BuildErrorKind::Fetch { reason: e.to_string() })),
                }
            }
        }

        let build_dir = build_root(&source_dir, build.subdir.as_deref());
        if !build_dir.is_dir() {
            return Err(fail(BuildErrorKind::Fetch {
                reason: format!(
                    "subdirectory '{}' does not exist in the fetched tree",
                    build.subdir.as_deref().unwrap_or_default()
                ),
            }));
        }

        let outcomes = patch::apply_all(&build_dir, &build.patches).map_err(fail)?;
        for outcome in &outcomes {
            tracing::info!(
                entry = %name,
                patch = %outcome.rule,
                files = outcome.files,
                matches = outcome.matches,
                "applied patch"
            );
        }

        let backend = strategy(&build.backend);
        if !build.features.is_empty() && !backend.accepts_features() {
            tracing::debug!(entry = %name, backend = backend.name(), "backend ignores features");
        }
        let ctx = BackendContext {
            entry: name.clone(),
            build_dir,
            install_dir,
            staging_root: self.layout.staging_root().to_path_buf(),
            pg_config: self.options.pg_config.clone(),
            jobs: self.options.jobs,
            features: build.features.clone(),
            disable_default_features: build.disable_default_features,
        };

        tracing::info!(entry = %name, backend = backend.name(), "invoking backend");
        let runner = StepRunner::new(
            log_path,
            self.options.backend_timeout,
            self.options.log_tail_lines,
        );
        runner
            .run(&backend.steps(&ctx), &ctx, cancel)
            .await
            .map_err(fail)?;

        let artifacts = artifacts::collect(&backend.artifact_dir(&ctx), &staging_dir).map_err(fail)?;
        tracing::info!(entry = %name, artifacts = artifacts.len(), "collected artifacts");

        Ok(BuildOutput {
            entry: name,
            staging_dir,
            artifacts,
        })
    }
}
