//! Command implementations for pgext-cli

pub mod build;
pub mod plan;
pub mod resolve;
pub mod validate;

pub use build::run_build;
pub use plan::run_plan;
pub use resolve::run_resolve;
pub use validate::run_validate;

use std::path::Path;

use colored::Colorize;
use pgext_catalog::Profile;
use pgext_gate::{DeclaredNames, GateReport, PrebuildGate};

use crate::error::Result;
use crate::settings::Settings;

/// Pre-build gate with whichever descriptors are configured or passed.
fn prebuild_gate(
    settings: &Settings,
    preload: Option<&Path>,
    bootstrap: Option<&Path>,
    profile: Profile,
) -> Result<PrebuildGate> {
    let mut gate = PrebuildGate::new(profile);
    if let Some(path) = settings.preload_path(preload) {
        gate = gate.with_preload(DeclaredNames::load_preload(&path)?);
    }
    if let Some(path) = settings.bootstrap_path(bootstrap) {
        gate = gate.with_bootstrap(DeclaredNames::load_bootstrap(&path)?);
    }
    Ok(gate)
}

/// One line per finding.
fn print_gate_failures(report: &GateReport) {
    for failure in &report.failures {
        println!("{} {}", "✗".red(), failure);
    }
}
