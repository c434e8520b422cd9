//! Directory layout for a build run.
//!
//! Every entry owns one namespaced directory under each root, so concurrent
//! builds never write to the same place:
//!
//! ```text
//! {staging_root}/{name}/          collected artifacts (packaging input)
//! {work_root}/src/{name}/         fetched source tree
//! {work_root}/install/{name}/     backend install prefix / DESTDIR
//! {work_root}/logs/{name}.log     captured backend output
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result, io};

/// Reject names that would escape their namespace directory.
pub fn validate_entry_dir_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidDirName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name must not be a relative path marker"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(invalid("name must not contain path separators"));
    }
    Ok(())
}

/// Staging and work roots for one build run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    staging_root: PathBuf,
    work_root: PathBuf,
}

impl BuildLayout {
    pub fn new(staging_root: impl Into<PathBuf>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            work_root: work_root.into(),
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// `{staging_root}/{name}`
    pub fn staging_dir(&self, name: &str) -> Result<PathBuf> {
        validate_entry_dir_name(name)?;
        Ok(self.staging_root.join(name))
    }

    /// `{work_root}/src/{name}`
    pub fn source_dir(&self, name: &str) -> Result<PathBuf> {
        validate_entry_dir_name(name)?;
        Ok(self.work_root.join("src").join(name))
    }

    /// `{work_root}/install/{name}`
    pub fn install_dir(&self, name: &str) -> Result<PathBuf> {
        validate_entry_dir_name(name)?;
        Ok(self.work_root.join("install").join(name))
    }

    /// `{work_root}/logs/{name}.log`
    pub fn log_path(&self, name: &str) -> Result<PathBuf> {
        validate_entry_dir_name(name)?;
        Ok(self.work_root.join("logs").join(format!("{name}.log")))
    }

    /// Create both roots and resolve them to absolute paths.
    ///
    /// Backends run with their own working directory, so every path handed
    /// to them must be absolute.
    pub fn prepare(&self) -> Result<Self> {
        for dir in [
            self.staging_root.clone(),
            self.work_root.join("src"),
            self.work_root.join("install"),
            self.work_root.join("logs"),
        ] {
            fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }
        let staging_root =
            dunce::canonicalize(&self.staging_root).map_err(|e| Error::io(&self.staging_root, e))?;
        let work_root =
            dunce::canonicalize(&self.work_root).map_err(|e| Error::io(&self.work_root, e))?;
        Ok(Self {
            staging_root,
            work_root,
        })
    }

    /// Wipe and recreate the per-entry source and install directories and
    /// clear the entry's staging directory.
    pub fn reset_entry(&self, name: &str) -> Result<()> {
        for dir in [self.source_dir(name)?, self.install_dir(name)?] {
            io::remove_dir_if_exists(&dir)?;
            fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }
        io::remove_dir_if_exists(&self.staging_dir(name)?)
    }

    /// Remove the staging directory of an entry that must not ship.
    pub fn clear_staging(&self, name: &str) -> Result<()> {
        let dir = self.staging_dir(name)?;
        tracing::debug!(entry = %name, dir = %dir.display(), "clearing staging directory");
        io::remove_dir_if_exists(&dir)
    }
}
