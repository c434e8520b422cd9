//! Build command implementation

use std::path::Path;

use chrono::Utc;
use colored::Colorize;
use pgext_build::{BuildMode, BuildReport, Dispatcher, Scheduler};
use pgext_catalog::{CatalogEntry, Profile, ResolvedManifest};
use pgext_fs::BuildLayout;
use pgext_gate::PostbuildGate;
use pgext_git::GitFetcher;
use tokio_util::sync::CancellationToken;

use super::{prebuild_gate, print_gate_failures};
use crate::error::{CliError, Result};
use crate::settings::Settings;

/// Gate, build and re-gate the manifest; records build metadata in it.
pub async fn run_build(
    settings: &Settings,
    manifest: Option<&Path>,
    mode: BuildMode,
    concurrency: Option<usize>,
    profile: Profile,
    cancel: &CancellationToken,
) -> Result<bool> {
    let manifest_path = settings.manifest_path(manifest);
    if !manifest_path.is_file() {
        return Err(CliError::user(format!(
            "manifest {} not found; run `pgext resolve` first",
            manifest_path.display()
        )));
    }
    let mut manifest = ResolvedManifest::load(&manifest_path)?;
    let entries: Vec<CatalogEntry> = manifest.entries.iter().map(|r| r.entry.clone()).collect();

    let prebuild = prebuild_gate(settings, None, None, profile)?
        .check(&entries, manifest.summary.as_ref());
    if !prebuild.is_success() {
        print_gate_failures(&prebuild);
        println!(
            "{} pre-build gate failed with {} finding(s); nothing built",
            "✗".red(),
            prebuild.failures.len()
        );
        return Ok(false);
    }

    settings.network_timeouts().apply()?;
    let layout = BuildLayout::new(settings.staging_root(), settings.work_root()).prepare()?;
    let dispatcher = Dispatcher::new(
        GitFetcher,
        settings.trust.clone(),
        layout.clone(),
        settings.dispatch_options(),
    );
    let scheduler = Scheduler::new(
        dispatcher,
        concurrency.unwrap_or(settings.concurrency.build),
        mode,
    );

    let started_at = Utc::now();
    let report = scheduler.run(&manifest, profile, cancel).await?;
    let finished_at = Utc::now();

    manifest.build = Some(report.metadata(&manifest, profile, started_at, finished_at));
    manifest.save(&manifest_path)?;
    print_report(&report);

    if !report.is_success() {
        return Ok(false);
    }

    let postbuild = PostbuildGate::new(profile, layout.staging_root()).check(&entries);
    if !postbuild.is_success() {
        print_gate_failures(&postbuild);
        return Ok(false);
    }
    println!(
        "{} Built {} entries into {}",
        "✓".green(),
        report.built.len(),
        layout.staging_root().display()
    );
    Ok(true)
}

fn print_report(report: &BuildReport) {
    for output in &report.built {
        println!(
            "{} {} ({} artifacts)",
            "✓".green(),
            output.entry.cyan(),
            output.artifacts.len()
        );
    }
    for name in &report.skipped {
        println!("{} {} {}", "-".yellow(), name.cyan(), "skipped".dimmed());
    }
    for failure in &report.failures {
        println!("{} {}", "✗".red(), failure);
        for line in failure.kind.log_tail() {
            println!("    | {line}");
        }
    }
    if !report.is_success() {
        println!(
            "{} {} built, {} failed, {} skipped",
            "✗".red(),
            report.built.len(),
            report.failures.len(),
            report.skipped.len()
        );
    }
}
