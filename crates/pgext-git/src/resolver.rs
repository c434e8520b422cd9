//! Tag-to-commit resolution.
//!
//! Every entry resolves independently, so a catalog is resolved concurrently
//! with a bounded number of in-flight lookups. Failures are collected per
//! entry and never stop the other lookups.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pgext_catalog::{
    Catalog, CatalogEntry, CatalogSummary, ResolvedCatalogEntry, ResolvedManifest, Source,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::interrupt::Interrupt;
use crate::remote::{RemoteRefs, select_tag};
use crate::trust::TrustPolicy;

/// Bounds for a resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Maximum concurrent remote lookups.
    pub concurrency: usize,
    /// Per-entry timeout.
    pub timeout: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Why an entry could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveErrorKind {
    /// Tag missing upstream, or the remote could not be listed.
    Resolution { reason: String },
    UntrustedSource { reason: String },
    Timeout { seconds: u64 },
    Cancelled,
}

impl fmt::Display for ResolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolution { reason } => write!(f, "ResolutionError: {reason}"),
            Self::UntrustedSource { reason } => write!(f, "UntrustedSourceError: {reason}"),
            Self::Timeout { seconds } => {
                write!(f, "TimeoutError: no answer from remote within {seconds}s")
            }
            Self::Cancelled => write!(f, "Cancelled: resolution interrupted"),
        }
    }
}

/// A per-entry resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveFailure {
    pub entry: String,
    #[serde(flatten)]
    pub kind: ResolveErrorKind,
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entry, self.kind)
    }
}

/// Outcome of resolving a whole catalog.
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    /// Successfully frozen entries, sorted by name.
    pub resolved: Vec<ResolvedCatalogEntry>,
    /// Failures, sorted by entry name.
    pub failures: Vec<ResolveFailure>,
}

impl ResolveReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Build the manifest artifact, refusing while any entry failed.
    pub fn into_manifest(
        self,
        summary: Option<CatalogSummary>,
        generated_at: DateTime<Utc>,
    ) -> Result<ResolvedManifest> {
        if !self.failures.is_empty() {
            return Err(Error::Unresolved {
                count: self.failures.len(),
            });
        }
        Ok(ResolvedManifest::new(self.resolved, summary, generated_at)?)
    }
}

/// Freeze one entry against the advertised refs of its repository.
async fn resolve_entry<R: RemoteRefs + ?Sized>(
    remote: &R,
    policy: &TrustPolicy,
    entry: CatalogEntry,
    interrupt: &Interrupt,
    timeout: Duration,
) -> std::result::Result<ResolvedCatalogEntry, ResolveErrorKind> {
    let freeze = |entry: CatalogEntry, commit: Option<String>| {
        ResolvedCatalogEntry::freeze(entry, commit).map_err(|e| ResolveErrorKind::Resolution {
            reason: e.to_string(),
        })
    };

    let (repository, tag) = match &entry.source {
        Source::Builtin => return freeze(entry, None),
        Source::GitRef { repository, .. } => {
            check_trust(policy, repository)?;
            return freeze(entry, None);
        }
        Source::GitTag { repository, tag } => (repository.clone(), tag.clone()),
    };
    check_trust(policy, &repository)?;

    let refs = remote
        .list_refs(&repository, interrupt)
        .await
        .map_err(|e| match e {
            Error::Cancelled => ResolveErrorKind::Cancelled,
            Error::DeadlineExceeded => ResolveErrorKind::Timeout {
                seconds: timeout.as_secs(),
            },
            e => ResolveErrorKind::Resolution {
                reason: e.to_string(),
            },
        })?;
    let commit = select_tag(&refs, &tag).ok_or_else(|| ResolveErrorKind::Resolution {
        reason: Error::TagNotFound {
            repository: repository.clone(),
            tag: tag.clone(),
        }
        .to_string(),
    })?;
    tracing::info!(entry = %entry.name, tag = %tag, commit = %commit, "resolved tag");
    freeze(entry, Some(commit))
}

fn check_trust(
    policy: &TrustPolicy,
    repository: &str,
) -> std::result::Result<(), ResolveErrorKind> {
    policy
        .check(repository)
        .map_err(|e| ResolveErrorKind::UntrustedSource {
            reason: e.to_string(),
        })
}

/// Concurrent catalog resolver.
pub struct Resolver<R> {
    remote: Arc<R>,
    policy: Arc<TrustPolicy>,
    options: ResolveOptions,
}

impl<R: RemoteRefs + 'static> Resolver<R> {
    pub fn new(remote: R, policy: TrustPolicy, options: ResolveOptions) -> Self {
        Self {
            remote: Arc::new(remote),
            policy: Arc::new(policy),
            options,
        }
    }

    /// Resolve a single entry within the configured timeout.
    pub async fn resolve(
        &self,
        entry: CatalogEntry,
    ) -> std::result::Result<ResolvedCatalogEntry, ResolveFailure> {
        let name = entry.name.clone();
        let timeout = self.options.timeout;
        let interrupt = Interrupt::within(&CancellationToken::new(), timeout);
        resolve_entry(self.remote.as_ref(), &self.policy, entry, &interrupt, timeout)
            .await
            .map_err(|kind| ResolveFailure { entry: name, kind })
    }

    /// Resolve every entry of `catalog`.
    pub async fn resolve_catalog(
        &self,
        catalog: &Catalog,
        cancel: &CancellationToken,
    ) -> ResolveReport {
        self.resolve_all(catalog.entries().cloned().collect(), cancel)
            .await
    }

    /// Resolve `entries` concurrently, collecting every failure.
    ///
    /// Cancelling `cancel` stops in-flight lookups and reports the affected
    /// entries as cancelled. Each lookup is interrupted at its own timeout.
    pub async fn resolve_all(
        &self,
        entries: Vec<CatalogEntry>,
        cancel: &CancellationToken,
    ) -> ResolveReport {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let timeout = self.options.timeout;
        let total = entries.len();

        let mut handles = Vec::with_capacity(total);
        for entry in entries {
            let name = entry.name.clone();
            let semaphore = Arc::clone(&semaphore);
            let remote = Arc::clone(&self.remote);
            let policy = Arc::clone(&self.policy);
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return Err(ResolveErrorKind::Cancelled),
                    permit = semaphore.acquire_owned() => permit.map_err(|e| ResolveErrorKind::Resolution {
                        reason: e.to_string(),
                    })?,
                };
                let interrupt = Interrupt::within(&cancel, timeout);
                let lookup = resolve_entry(remote.as_ref(), &policy, entry, &interrupt, timeout);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ResolveErrorKind::Cancelled),
                    result = tokio::time::timeout(timeout, lookup) => {
                        result.unwrap_or(Err(ResolveErrorKind::Timeout { seconds: timeout.as_secs() }))
                    }
                }
            });
            handles.push((name, handle));
        }

        let mut report = ResolveReport::default();
        for (name, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|e| {
                Err(ResolveErrorKind::Resolution {
                    reason: format!("resolution task failed: {e}"),
                })
            });
            match outcome {
                Ok(resolved) => report.resolved.push(resolved),
                Err(kind) => {
                    tracing::warn!(entry = %name, error = %kind, "resolution failed");
                    report.failures.push(ResolveFailure { entry: name, kind });
                }
            }
        }
        report.resolved.sort_by(|a, b| a.name().cmp(b.name()));
        report.failures.sort_by(|a, b| a.entry.cmp(&b.entry));

        tracing::info!(
            total,
            resolved = report.resolved.len(),
            failed = report.failures.len(),
            "resolution finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteRef;
    use async_trait::async_trait;
    use pgext_test_utils::catalog::EntryBuilder;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// Serves fixed refs per repository; unknown repositories fail.
    struct StaticRemote {
        refs: HashMap<String, Vec<RemoteRef>>,
        delay: Duration,
        /// Keep sleeping after the interrupt fires.
        ignore_interrupt: bool,
    }

    impl StaticRemote {
        fn new() -> Self {
            Self {
                refs: HashMap::new(),
                delay: Duration::ZERO,
                ignore_interrupt: false,
            }
        }

        fn with(mut self, repository: &str, refs: Vec<RemoteRef>) -> Self {
            self.refs.insert(repository.to_string(), refs);
            self
        }
    }

    #[async_trait]
    impl RemoteRefs for StaticRemote {
        async fn list_refs(&self, repository: &str, interrupt: &Interrupt) -> Result<Vec<RemoteRef>> {
            if self.ignore_interrupt {
                tokio::time::sleep(self.delay).await;
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    reason = interrupt.fired() => return Err(reason),
                }
            }
            self.refs
                .get(repository)
                .cloned()
                .ok_or_else(|| Error::Task(format!("cannot reach {repository}")))
        }
    }

    const VECTOR: &str = "https://github.com/pgvector/pgvector.git";
    const CRON: &str = "https://github.com/citusdata/pg_cron.git";

    fn resolver(remote: StaticRemote) -> Resolver<StaticRemote> {
        Resolver::new(remote, TrustPolicy::default(), ResolveOptions::default())
    }

    #[tokio::test]
    async fn test_annotated_tag_resolves_to_commit() {
        let remote = StaticRemote::new().with(
            VECTOR,
            vec![
                RemoteRef::new("refs/tags/v0.8.0", "tagobject"),
                RemoteRef::new("refs/tags/v0.8.0^{}", "commit"),
            ],
        );
        let entry = EntryBuilder::git_tag("vector", VECTOR, "v0.8.0").build();

        let resolved = resolver(remote).resolve(entry).await.unwrap();
        assert_eq!(resolved.commit(), Some("commit"));
    }

    #[tokio::test]
    async fn test_git_ref_resolution_is_idempotent() {
        let entry = EntryBuilder::git_ref("cron", CRON, "0123abcd").build();
        let resolver = resolver(StaticRemote::new());

        let once = resolver.resolve(entry).await.unwrap();
        let twice = resolver.resolve(once.entry.clone()).await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.commit(), Some("0123abcd"));

        let again = resolver.resolve(once.as_pinned_entry()).await.unwrap();
        assert_eq!(again, once);
    }

    #[tokio::test]
    async fn test_builtin_unchanged() {
        let entry = EntryBuilder::builtin("plpgsql").build();
        let resolved = resolver(StaticRemote::new()).resolve(entry.clone()).await.unwrap();
        assert_eq!(resolved.entry, entry);
        assert_eq!(resolved.commit(), None);
    }

    #[tokio::test]
    async fn test_all_failures_are_collected() {
        let remote = StaticRemote::new().with(
            VECTOR,
            vec![RemoteRef::new("refs/tags/v0.8.0", "commit")],
        );
        let entries = vec![
            EntryBuilder::git_tag("vector", VECTOR, "v0.8.0").build(),
            EntryBuilder::git_tag("stale", VECTOR, "v9.9.9").build(),
            EntryBuilder::git_tag("offline", CRON, "v1.6.4").build(),
            EntryBuilder::git_tag("sketchy", "https://evil.example.net/x.git", "v1").build(),
        ];

        let report = resolver(remote)
            .resolve_all(entries, &CancellationToken::new())
            .await;

        assert_eq!(report.resolved.len(), 1);
        let failed: Vec<&str> = report.failures.iter().map(|f| f.entry.as_str()).collect();
        assert_eq!(failed, vec!["offline", "sketchy", "stale"]);
        assert!(matches!(report.failures[1].kind, ResolveErrorKind::UntrustedSource { .. }));
        assert!(report.failures[2].to_string().contains("v9.9.9"));
        assert!(report.into_manifest(None, Utc::now()).is_err());
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_failure() {
        let mut remote = StaticRemote::new().with(VECTOR, vec![]);
        remote.delay = Duration::from_secs(5);
        let resolver = Resolver::new(
            remote,
            TrustPolicy::default(),
            ResolveOptions {
                concurrency: 2,
                timeout: Duration::from_millis(50),
            },
        );
        let entries = vec![EntryBuilder::git_tag("vector", VECTOR, "v1").build()];

        let report = resolver.resolve_all(entries, &CancellationToken::new()).await;
        assert_eq!(
            report.failures[0].kind,
            ResolveErrorKind::Timeout { seconds: 0 }
        );
    }

    #[tokio::test]
    async fn test_timeout_bounds_remotes_that_ignore_interrupt() {
        let mut remote = StaticRemote::new().with(VECTOR, vec![]);
        remote.delay = Duration::from_secs(5);
        remote.ignore_interrupt = true;
        let resolver = Resolver::new(
            remote,
            TrustPolicy::default(),
            ResolveOptions {
                concurrency: 1,
                timeout: Duration::from_millis(50),
            },
        );
        let entries = vec![EntryBuilder::git_tag("vector", VECTOR, "v1").build()];

        let started = std::time::Instant::now();
        let report = resolver.resolve_all(entries, &CancellationToken::new()).await;
        assert!(matches!(report.failures[0].kind, ResolveErrorKind::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_single_resolve_honours_timeout() {
        let mut remote = StaticRemote::new().with(VECTOR, vec![]);
        remote.delay = Duration::from_secs(30);
        let resolver = Resolver::new(
            remote,
            TrustPolicy::default(),
            ResolveOptions {
                concurrency: 1,
                timeout: Duration::from_millis(50),
            },
        );
        let failure = resolver
            .resolve(EntryBuilder::git_tag("vector", VECTOR, "v1").build())
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ResolveErrorKind::Timeout { seconds: 0 });
    }

    #[tokio::test]
    async fn test_cancellation_reports_every_entry() {
        let mut remote = StaticRemote::new().with(VECTOR, vec![]);
        remote.delay = Duration::from_secs(30);
        let resolver = resolver(remote);
        let entries = (0..3)
            .map(|i| EntryBuilder::git_tag(&format!("e{i}"), VECTOR, "v1").build())
            .collect();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = resolver.resolve_all(entries, &cancel).await;
        assert_eq!(report.failures.len(), 3);
        assert!(report
            .failures
            .iter()
            .all(|f| f.kind == ResolveErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn test_manifest_from_successful_report() {
        let remote = StaticRemote::new().with(
            VECTOR,
            vec![RemoteRef::new("refs/tags/v0.8.0", "c0ffee")],
        );
        let catalog = Catalog::from_entries(
            vec![
                EntryBuilder::git_tag("vector", VECTOR, "v0.8.0").build(),
                EntryBuilder::builtin("plpgsql").build(),
            ],
            None,
        )
        .unwrap();

        let report = resolver(remote)
            .resolve_catalog(&catalog, &CancellationToken::new())
            .await;
        let manifest = report.into_manifest(None, Utc::now()).unwrap();
        assert_eq!(manifest.get("vector").unwrap().commit(), Some("c0ffee"));
        assert!(manifest.get("plpgsql").is_some());
    }
}
