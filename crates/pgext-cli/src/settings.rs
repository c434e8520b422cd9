//! `pgext.toml` settings.
//!
//! Every key has a default, so a missing settings file is valid. Relative
//! paths are taken relative to the directory holding the settings file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pgext_build::DispatchOptions;
use pgext_fs::ConfigStore;
use pgext_git::{NetworkTimeouts, ResolveOptions, TrustPolicy};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings file looked up in the working directory when none is given.
pub const SETTINGS_FILENAME: &str = "pgext.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Concurrency {
    pub resolve: usize,
    pub build: usize,
}

impl Default for Concurrency {
    fn default() -> Self {
        Self {
            resolve: 4,
            build: 2,
        }
    }
}

/// Timeouts in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    pub resolve: u64,
    pub fetch: u64,
    pub backend: u64,
    /// TCP connect bound for git remotes.
    pub connect: u64,
    /// Bound on a single stalled git socket read or write.
    pub network_io: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            resolve: 60,
            fetch: 300,
            backend: 1800,
            connect: 15,
            network_io: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Descriptors {
    pub preload: Option<PathBuf>,
    pub bootstrap: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub catalog: PathBuf,
    pub manifest: PathBuf,
    pub staging_root: PathBuf,
    pub work_root: PathBuf,
    pub pg_config: String,
    pub log_tail_lines: usize,
    pub trust: TrustPolicy,
    pub concurrency: Concurrency,
    pub timeouts: Timeouts,
    pub descriptors: Descriptors,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from(pgext_catalog::CATALOG_FILENAME),
            manifest: PathBuf::from(pgext_catalog::MANIFEST_FILENAME),
            staging_root: PathBuf::from("build/staging"),
            work_root: PathBuf::from("build/work"),
            pg_config: "pg_config".to_string(),
            log_tail_lines: 40,
            trust: TrustPolicy::default(),
            concurrency: Concurrency::default(),
            timeouts: Timeouts::default(),
            descriptors: Descriptors::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Load `explicit` (which must exist), else `pgext.toml` in `cwd` when
    /// present, else defaults rooted at `cwd`.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(cwd.join(path)),
            None => Some(cwd.join(SETTINGS_FILENAME)).filter(|p| p.is_file()),
        };

        let Some(path) = path else {
            tracing::debug!("no settings file, using defaults");
            return Ok(Self {
                base_dir: cwd.to_path_buf(),
                ..Self::default()
            });
        };

        let mut settings: Self = ConfigStore::new().load(&path)?;
        settings.base_dir = path
            .parent()
            .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// `path` relative to the settings directory (absolute paths unchanged).
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    pub fn catalog_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map_or_else(|| self.resolve_path(&self.catalog), Path::to_path_buf)
    }

    pub fn manifest_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map_or_else(|| self.resolve_path(&self.manifest), Path::to_path_buf)
    }

    pub fn preload_path(&self, flag: Option<&Path>) -> Option<PathBuf> {
        flag.map(Path::to_path_buf)
            .or_else(|| self.descriptors.preload.as_deref().map(|p| self.resolve_path(p)))
    }

    pub fn bootstrap_path(&self, flag: Option<&Path>) -> Option<PathBuf> {
        flag.map(Path::to_path_buf)
            .or_else(|| self.descriptors.bootstrap.as_deref().map(|p| self.resolve_path(p)))
    }

    pub fn staging_root(&self) -> PathBuf {
        self.resolve_path(&self.staging_root)
    }

    pub fn work_root(&self) -> PathBuf {
        self.resolve_path(&self.work_root)
    }

    pub fn resolve_options(&self, concurrency: Option<usize>) -> ResolveOptions {
        ResolveOptions {
            concurrency: concurrency.unwrap_or(self.concurrency.resolve).max(1),
            timeout: Duration::from_secs(self.timeouts.resolve),
        }
    }

    pub fn network_timeouts(&self) -> NetworkTimeouts {
        NetworkTimeouts {
            connect: Duration::from_secs(self.timeouts.connect),
            io: Duration::from_secs(self.timeouts.network_io),
        }
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            pg_config: self.pg_config.clone(),
            fetch_timeout: Duration::from_secs(self.timeouts.fetch),
            backend_timeout: Duration::from_secs(self.timeouts.backend),
            log_tail_lines: self.log_tail_lines,
            ..DispatchOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(None, dir.path()).unwrap();
        assert_eq!(settings.catalog_path(None), dir.path().join("extensions.toml"));
        assert_eq!(settings.staging_root(), dir.path().join("build/staging"));
        assert_eq!(settings.resolve_options(None).concurrency, 4);
        assert!(settings.preload_path(None).is_none());
        assert!(!settings.trust.allow_local);
    }

    #[test]
    fn test_partial_file_relative_to_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ci")).unwrap();
        std::fs::write(
            dir.path().join("ci/pgext.toml"),
            r#"
catalog = "../catalog/extensions.toml"

[trust]
allow_local = true

[timeouts]
backend = 60

[descriptors]
preload = "preload.list"
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(Path::new("ci/pgext.toml")), dir.path()).unwrap();
        assert_eq!(
            settings.catalog_path(None),
            dir.path().join("ci/../catalog/extensions.toml")
        );
        assert_eq!(settings.preload_path(None), Some(dir.path().join("ci/preload.list")));
        assert!(settings.trust.allow_local);
        assert_eq!(settings.trust.hosts, TrustPolicy::default().hosts);
        assert_eq!(settings.timeouts.backend, 60);
        assert_eq!(settings.timeouts.fetch, 300);
        assert_eq!(settings.dispatch_options().backend_timeout, Duration::from_secs(60));
        assert_eq!(settings.network_timeouts(), NetworkTimeouts::default());
    }

    #[test]
    fn test_network_timeouts_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pgext.toml"),
            "[timeouts]\nconnect = 5\nnetwork_io = 20\n",
        )
        .unwrap();
        let settings = Settings::load(None, dir.path()).unwrap();
        assert_eq!(
            settings.network_timeouts(),
            NetworkTimeouts {
                connect: Duration::from_secs(5),
                io: Duration::from_secs(20),
            }
        );
        assert_eq!(settings.timeouts.resolve, 60);
    }

    #[test]
    fn test_flags_override_file() {
        let settings = Settings::default();
        assert_eq!(
            settings.manifest_path(Some(Path::new("/tmp/lock.json"))),
            PathBuf::from("/tmp/lock.json")
        );
        assert_eq!(settings.resolve_options(Some(8)).concurrency, 8);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pgext.toml"), "catalgo = \"typo.toml\"\n").unwrap();
        assert!(Settings::load(None, dir.path()).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(Path::new("absent.toml")), dir.path()).is_err());
    }
}
