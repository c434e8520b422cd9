//! Level-by-level build scheduling.
//!
//! Entries inside one dependency level build concurrently under a
//! semaphore; a level starts only after the previous one has drained. A
//! dependent of a failed entry is never started.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pgext_catalog::{
    BuildMetadata, BuildRecord, BuildStatus, Profile, ResolvedCatalogEntry, ResolvedManifest,
    sequence,
};
use pgext_git::SourceFetcher;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{BuildOutput, Dispatcher};
use crate::error::{BuildErrorKind, BuildFailure, Result};

/// What happens to the rest of the plan when an entry fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildMode {
    /// Cancel in-flight builds and start nothing new.
    #[default]
    FailFast,
    /// Keep building everything that does not depend on a failure.
    BestEffort,
}

/// Outcome of a scheduled run. Every list is sorted by entry name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub built: Vec<BuildOutput>,
    pub failures: Vec<BuildFailure>,
    /// Planned entries that never ran or were cancelled mid-build.
    pub skipped: Vec<String>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }

    /// Per-entry records for every entry of `manifest`; entries outside the
    /// plan are recorded as skipped.
    pub fn metadata(
        &self,
        manifest: &ResolvedManifest,
        profile: Profile,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> BuildMetadata {
        let built: HashMap<&str, &BuildOutput> =
            self.built.iter().map(|o| (o.entry.as_str(), o)).collect();
        let failed: BTreeSet<&str> = self.failures.iter().map(|f| f.entry.as_str()).collect();

        let entries = manifest
            .entries
            .iter()
            .map(|resolved| {
                let name = resolved.name();
                match built.get(name) {
                    Some(output) => BuildRecord {
                        name: name.to_string(),
                        status: BuildStatus::Built,
                        artifacts: output.artifacts.clone(),
                    },
                    None => BuildRecord {
                        name: name.to_string(),
                        status: if failed.contains(name) {
                            BuildStatus::Failed
                        } else {
                            BuildStatus::Skipped
                        },
                        artifacts: Vec::new(),
                    },
                }
            })
            .collect();

        BuildMetadata {
            started_at,
            finished_at,
            profile,
            entries,
        }
    }
}

/// Drives a [`Dispatcher`] over a sequenced manifest.
pub struct Scheduler<F> {
    dispatcher: Arc<Dispatcher<F>>,
    concurrency: usize,
    mode: BuildMode,
}

impl<F: SourceFetcher + 'static> Scheduler<F> {
    pub fn new(dispatcher: Dispatcher<F>, concurrency: usize, mode: BuildMode) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            concurrency: concurrency.max(1),
            mode,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<F> {
        &self.dispatcher
    }

    /// Build every entry of `manifest` enabled under `profile`.
    ///
    /// Sequencing errors abort before anything runs. Per-entry failures are
    /// collected into the report. Staging directories of disabled entries
    /// are removed first so nothing stale ships.
    pub async fn run(
        &self,
        manifest: &ResolvedManifest,
        profile: Profile,
        cancel: &CancellationToken,
    ) -> Result<BuildReport> {
        let plan = sequence(&manifest.entries, profile)?;

        let layout = self.dispatcher.layout();
        for resolved in &manifest.entries {
            if !resolved.entry.is_enabled(profile) {
                layout.clear_staging(resolved.name())?;
            }
        }

        tracing::info!(
            entries = plan.len(),
            levels = plan.levels().len(),
            concurrency = self.concurrency,
            mode = ?self.mode,
            "starting build"
        );

        let run_token = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut report = BuildReport::default();
        // Failed, skipped or dependency-blocked entries
        let mut blocked: BTreeSet<String> = BTreeSet::new();

        for (depth, level) in plan.into_levels().into_iter().enumerate() {
            tracing::debug!(level = depth, entries = level.len(), "building level");
            let mut tasks = JoinSet::new();
            let mut pending: HashMap<Id, String> = HashMap::new();

            for resolved in level {
                let name = resolved.name().to_string();
                if run_token.is_cancelled() {
                    blocked.insert(name.clone());
                    report.skipped.push(name);
                    continue;
                }
                if let Some(dependency) = resolved
                    .entry
                    .dependencies
                    .iter()
                    .find(|d| blocked.contains(d.as_str()))
                {
                    tracing::warn!(entry = %name, dependency = %dependency, "dependency did not build");
                    report.failures.push(BuildFailure::new(
                        name.clone(),
                        BuildErrorKind::DependencyFailed {
                            dependency: dependency.clone(),
                        },
                    ));
                    blocked.insert(name);
                    continue;
                }

                let dispatcher = Arc::clone(&self.dispatcher);
                let semaphore = Arc::clone(&semaphore);
                let token = run_token.clone();
                let handle = tasks.spawn(async move {
                    build_one(&dispatcher, semaphore, &resolved, &token).await
                });
                pending.insert(handle.id(), name);
            }

            while let Some(joined) = tasks.join_next_with_id().await {
                let (id, outcome) = match joined {
                    Ok((id, outcome)) => (id, outcome.map(|built| built.map_err(|f| f.kind))),
                    Err(e) => {
                        let id = e.id();
                        let payload = e.is_panic().then(|| e.into_panic());
                        let reason = panic_reason(payload);
                        (id, Some(Err(BuildErrorKind::TaskPanicked { reason })))
                    }
                };
                let Some(name) = pending.remove(&id) else {
                    continue;
                };

                match outcome {
                    Some(Ok(output)) => {
                        tracing::info!(entry = %name, "built");
                        report.built.push(output);
                    }
                    Some(Err(kind)) if kind != BuildErrorKind::Cancelled => {
                        tracing::error!(entry = %name, error = %kind, "build failed");
                        if self.mode == BuildMode::FailFast {
                            run_token.cancel();
                        }
                        report.failures.push(BuildFailure::new(name.clone(), kind));
                        blocked.insert(name);
                    }
                    Some(Err(_)) | None => {
                        blocked.insert(name.clone());
                        report.skipped.push(name);
                    }
                }
            }
        }

        report.built.sort_by(|a, b| a.entry.cmp(&b.entry));
        report.failures.sort_by(|a, b| a.entry.cmp(&b.entry));
        report.skipped.sort();
        tracing::info!(
            built = report.built.len(),
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            "build finished"
        );
        Ok(report)
    }
}

fn panic_reason(payload: Option<Box<dyn Any + Send>>) -> String {
    let Some(payload) = payload else {
        return "build task was aborted".to_string();
    };
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "build task panicked".to_string())
}

/// `None` when cancelled before a slot opened.
async fn build_one<F: SourceFetcher>(
    dispatcher: &Dispatcher<F>,
    semaphore: Arc<Semaphore>,
    resolved: &ResolvedCatalogEntry,
    cancel: &CancellationToken,
) -> Option<std::result::Result<BuildOutput, BuildFailure>> {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        permit = semaphore.acquire_owned() => permit.ok()?,
    };
    if cancel.is_cancelled() {
        return None;
    }
    Some(dispatcher.build(resolved, cancel).await)
}
