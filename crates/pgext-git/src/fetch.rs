//! Checkout of a pinned commit into an isolated directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::build::CheckoutBuilder;
use git2::{FetchOptions, Oid, Remote, Repository};
use pgext_catalog::PinnedSource;

use crate::error::{Error, Result};
use crate::interrupt::{Interrupt, NetworkTimeouts, run_blocking};

const FULL_REFSPECS: &[&str] = &[
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];

/// Materializes a pinned source tree on disk.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Replace `dest` with a checkout of `source` at its pinned commit.
    ///
    /// Gives up with [`Error::Cancelled`] or [`Error::DeadlineExceeded`]
    /// once `interrupt` fires.
    async fn fetch(&self, source: &PinnedSource, dest: &Path, interrupt: &Interrupt) -> Result<()>;
}

/// Fetches with libgit2 on the blocking pool.
///
/// Tries a depth-1 fetch of the exact commit first and falls back to
/// fetching every branch and tag when the transport cannot serve it.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitFetcher;

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(&self, source: &PinnedSource, dest: &Path, interrupt: &Interrupt) -> Result<()> {
        NetworkTimeouts::ensure_configured()?;
        let source = source.clone();
        let dest = dest.to_path_buf();
        run_blocking(interrupt, move |interrupt| checkout_pinned(&source, &dest, &interrupt)).await
    }
}

fn full_object_id(commit: &str) -> Option<Oid> {
    if commit.len() == 40 && commit.bytes().all(|b| b.is_ascii_hexdigit()) {
        Oid::from_str(commit).ok()
    } else {
        None
    }
}

/// Resolve a non-hash ref against what a full fetch brought in.
fn find_fetched(repo: &Repository, git_ref: &str) -> Option<Oid> {
    [
        format!("refs/tags/{git_ref}"),
        format!("refs/remotes/origin/{git_ref}"),
        git_ref.to_string(),
    ]
    .iter()
    .find_map(|spec| {
        repo.revparse_single(spec)
            .and_then(|obj| obj.peel_to_commit())
            .map(|c| c.id())
            .ok()
    })
}

fn fetch_options<'a>(interrupt: &Interrupt, depth: Option<i32>) -> FetchOptions<'a> {
    let mut options = FetchOptions::new();
    options.remote_callbacks(interrupt.callbacks());
    if let Some(depth) = depth {
        options.depth(depth);
    }
    options
}

fn fetch_all(remote: &mut Remote<'_>, interrupt: &Interrupt) -> Result<()> {
    interrupt.check()?;
    remote
        .fetch(FULL_REFSPECS, Some(&mut fetch_options(interrupt, None)), None)
        .map_err(|e| interrupt.explain(e.into()))
}

fn checkout_pinned(source: &PinnedSource, dest: &Path, interrupt: &Interrupt) -> Result<()> {
    let repository = source.repository.as_str();
    let commit = source.commit.as_str();

    pgext_fs::io::remove_dir_if_exists(dest)?;
    std::fs::create_dir_all(dest).map_err(|e| pgext_fs::Error::io(dest, e))?;

    let repo = Repository::init(dest)?;
    let mut remote = repo.remote_anonymous(repository)?;

    let target = match full_object_id(commit) {
        Some(oid) => {
            interrupt.check()?;
            let fetched = remote.fetch(&[commit], Some(&mut fetch_options(interrupt, Some(1))), None);
            interrupt.check()?;
            if fetched.is_err() || repo.find_commit(oid).is_err() {
                tracing::debug!(repository, commit, "shallow fetch unavailable, fetching all refs");
                fetch_all(&mut remote, interrupt)?;
            }
            oid
        }
        None => {
            fetch_all(&mut remote, interrupt)?;
            find_fetched(&repo, commit).ok_or_else(|| Error::RefNotFound {
                repository: repository.to_string(),
                git_ref: commit.to_string(),
            })?
        }
    };

    let object = repo
        .find_commit(target)
        .map_err(|_| Error::RefNotFound {
            repository: repository.to_string(),
            git_ref: commit.to_string(),
        })?
        .into_object();
    interrupt.check()?;
    repo.checkout_tree(&object, Some(CheckoutBuilder::new().force()))?;
    repo.set_head_detached(target)?;

    tracing::info!(repository, commit = %target, dest = %dest.display(), "checked out source");
    Ok(())
}

/// Path of the checkout's build root: `subdir` inside `dest` when given.
pub fn build_root(dest: &Path, subdir: Option<&str>) -> PathBuf {
    match subdir {
        Some(subdir) => dest.join(subdir),
        None => dest.to_path_buf(),
    }
}
