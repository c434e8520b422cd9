//! Filesystem layer for pgext-forge
//!
//! Provides atomic I/O, format-detected config loading, the per-entry
//! staging/work directory layout and content checksums.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod layout;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use layout::{BuildLayout, validate_entry_dir_name};
