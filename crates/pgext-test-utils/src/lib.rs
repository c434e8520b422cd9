//! Shared test utilities for the pgext-forge workspace.
//!
//! This crate provides standardised test fixtures to eliminate duplication
//! across crate test suites. It is a dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`git`]: upstream repositories with commits and tags, built with the `git` CLI
//! - [`catalog`]: [`catalog::EntryBuilder`] for typed catalog entries
//! - [`net`]: [`net::SilentServer`], a TCP peer that never responds

pub mod catalog;
pub mod git;
pub mod net;
