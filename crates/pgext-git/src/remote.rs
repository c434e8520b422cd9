//! Remote reference listing.
//!
//! The equivalent of `git ls-remote`: connect to a repository without a
//! local clone and list every advertised ref with the object it points at.

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use git2::{Direction, Remote};

use crate::error::Result;
use crate::interrupt::{Interrupt, NetworkTimeouts, run_blocking};

/// One advertised ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Full ref name, e.g. `refs/tags/v0.8.0` or `refs/tags/v0.8.0^{}`.
    pub name: String,
    /// Hex object id.
    pub oid: String,
}

impl RemoteRef {
    pub fn new(name: impl Into<String>, oid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            oid: oid.into(),
        }
    }
}

/// Source of advertised refs for a repository.
#[async_trait]
pub trait RemoteRefs: Send + Sync {
    /// List the refs of `repository`, giving up once `interrupt` fires.
    async fn list_refs(&self, repository: &str, interrupt: &Interrupt) -> Result<Vec<RemoteRef>>;
}

/// Pick the commit a tag points to.
///
/// Annotated tags are advertised twice: `refs/tags/{tag}` names the tag
/// object and `refs/tags/{tag}^{}` the commit it peels to. The peeled form
/// wins when present.
pub fn select_tag(refs: &[RemoteRef], tag: &str) -> Option<String> {
    let direct = format!("refs/tags/{tag}");
    let peeled = format!("{direct}^{{}}");
    refs.iter()
        .find(|r| r.name == peeled)
        .or_else(|| refs.iter().find(|r| r.name == direct))
        .map(|r| r.oid.clone())
}

/// Lists refs with libgit2 on the blocking pool, retrying transient network
/// errors with exponential backoff.
#[derive(Debug, Clone)]
pub struct Git2Remote {
    retry_budget: Duration,
}

impl Git2Remote {
    /// `retry_budget` bounds the total time spent retrying one listing.
    pub fn new(retry_budget: Duration) -> Self {
        Self { retry_budget }
    }
}

impl Default for Git2Remote {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

fn list_once(repository: &str, interrupt: &Interrupt) -> Result<Vec<RemoteRef>> {
    interrupt.check()?;
    let mut remote = Remote::create_detached(repository)?;
    let connection = remote
        .connect_auth(Direction::Fetch, Some(interrupt.callbacks()), None)
        .map_err(|e| interrupt.explain(e.into()))?;
    let refs = connection
        .list()?
        .iter()
        .map(|head| RemoteRef::new(head.name(), head.oid().to_string()))
        .collect();
    Ok(refs)
}

fn list_with_retry(repository: &str, budget: Duration, interrupt: &Interrupt) -> Result<Vec<RemoteRef>> {
    let budget = interrupt.remaining().map_or(budget, |left| left.min(budget));
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(250))
        .with_max_interval(Duration::from_secs(5))
        .with_max_elapsed_time(Some(budget))
        .build();

    backoff::retry(policy, || {
        list_once(repository, interrupt).map_err(|e| {
            if e.is_transient() && !interrupt.is_triggered() {
                tracing::debug!(repository, error = %e, "transient ref listing failure, retrying");
                backoff::Error::transient(e)
            } else {
                backoff::Error::permanent(interrupt.explain(e))
            }
        })
    })
    .map_err(|e| match e {
        backoff::Error::Permanent(e) => e,
        backoff::Error::Transient { err, .. } => interrupt.explain(err),
    })
}

#[async_trait]
impl RemoteRefs for Git2Remote {
    async fn list_refs(&self, repository: &str, interrupt: &Interrupt) -> Result<Vec<RemoteRef>> {
        NetworkTimeouts::ensure_configured()?;
        let repository = repository.to_string();
        let budget = self.retry_budget;
        run_blocking(interrupt, move |interrupt| {
            list_with_retry(&repository, budget, &interrupt)
        })
        .await
    }
}
