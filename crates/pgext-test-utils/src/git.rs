//! Upstream git repository fixtures.
//!
//! Repositories are created with the `git` CLI so that tags and history look
//! exactly like what a real forge would serve. Point catalog entries at
//! [`UpstreamRepo::url`] and allow local sources in the trust policy.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// A throwaway upstream repository on `main`.
pub struct UpstreamRepo {
    dir: TempDir,
}

impl UpstreamRepo {
    /// Initialise a repository with one commit containing `README.md`.
    ///
    /// # Panics
    /// Panics if any git operation fails.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("UpstreamRepo: tempdir failed: {e}"));
        let repo = Self { dir };
        repo.git(&["init"]);
        repo.git(&["config", "user.email", "test@test.com"]);
        repo.git(&["config", "user.name", "Test User"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo.git(&["config", "tag.gpgsign", "false"]);
        repo.commit_file("README.md", "# upstream\n", "Initial commit");
        // Older git versions may not support renaming the unborn default
        let _ = Command::new("git")
            .args(["branch", "-m", "main"])
            .current_dir(repo.path())
            .output();
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `file://` URL of the repository.
    pub fn url(&self) -> String {
        format!("file://{}", self.path().display())
    }

    /// Write `content` to `relative` (creating parents), commit it and return
    /// the new commit id.
    pub fn commit_file(&self, relative: &str, content: &str, message: &str) -> String {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("UpstreamRepo: create {}: {e}", parent.display()));
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("UpstreamRepo: write {}: {e}", path.display()));
        self.git(&["add", "."]);
        self.git(&["commit", "-m", message]);
        self.head()
    }

    /// Commit an executable build script at `relative`.
    #[cfg(unix)]
    pub fn commit_script(&self, relative: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("UpstreamRepo: create {}: {e}", parent.display()));
        }
        fs::write(&path, body)
            .unwrap_or_else(|e| panic!("UpstreamRepo: write {}: {e}", path.display()));
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .unwrap_or_else(|e| panic!("UpstreamRepo: chmod {}: {e}", path.display()));
        self.git(&["add", "."]);
        self.git(&["commit", "-m", "Add build script"]);
        self.head()
    }

    /// Create a lightweight tag at HEAD and return the commit it points to.
    pub fn tag_lightweight(&self, tag: &str) -> String {
        self.git(&["tag", tag]);
        self.head()
    }

    /// Create an annotated tag at HEAD and return the commit it points to
    /// (not the tag object).
    pub fn tag_annotated(&self, tag: &str) -> String {
        self.git(&["tag", "-a", tag, "-m", &format!("Release {tag}")]);
        self.head()
    }

    /// Id of the tag object behind an annotated tag.
    pub fn tag_object(&self, tag: &str) -> String {
        self.git_output(&["rev-parse", &format!("refs/tags/{tag}")])
    }

    /// Current HEAD commit id.
    pub fn head(&self) -> String {
        let repo = git2::Repository::open(self.path())
            .unwrap_or_else(|e| panic!("UpstreamRepo: open failed: {e}"));
        let head = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .unwrap_or_else(|e| panic!("UpstreamRepo: no HEAD commit: {e}"));
        head.id().to_string()
    }

    fn git(&self, args: &[&str]) {
        self.git_output(args);
    }

    fn git_output(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .unwrap_or_else(|e| panic!("UpstreamRepo: failed to run `git {args:?}`: {e}"));
        if !output.status.success() {
            panic!(
                "UpstreamRepo: `git {args:?}` failed:\n{}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}

impl Default for UpstreamRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory that certainly is not a git repository.
pub fn missing_repository_url(base: &Path) -> String {
    let path: PathBuf = base.join("does-not-exist.git");
    format!("file://{}", path.display())
}
