//! Validate command implementation

use std::path::Path;

use colored::Colorize;
use pgext_catalog::{Catalog, CatalogEntry, CatalogSummary, Profile, ResolvedManifest};
use pgext_gate::PostbuildGate;

use super::{prebuild_gate, print_gate_failures};
use crate::error::{CliError, Result};
use crate::settings::Settings;

/// Flags of the validate command.
#[derive(Debug, Clone, Default)]
pub struct ValidateArgs<'a> {
    pub manifest: Option<&'a Path>,
    pub catalog: Option<&'a Path>,
    pub preload: Option<&'a Path>,
    pub bootstrap: Option<&'a Path>,
    pub post_build: bool,
    pub staging: Option<&'a Path>,
    pub profile: Profile,
    pub json: bool,
}

/// Entries to validate: an explicit manifest, an explicit catalog, the
/// configured manifest when it exists, or the configured catalog.
fn load_entries(
    settings: &Settings,
    args: &ValidateArgs<'_>,
) -> Result<(Vec<CatalogEntry>, Option<CatalogSummary>)> {
    let from_manifest = |path: &Path| -> Result<(Vec<CatalogEntry>, Option<CatalogSummary>)> {
        if !path.is_file() {
            return Err(CliError::user(format!("manifest {} not found", path.display())));
        }
        let manifest = ResolvedManifest::load(path)?;
        tracing::debug!(path = %path.display(), "validating manifest");
        Ok((
            manifest.entries.into_iter().map(|r| r.entry).collect(),
            manifest.summary,
        ))
    };
    let from_catalog = |path: &Path| -> Result<(Vec<CatalogEntry>, Option<CatalogSummary>)> {
        let catalog = Catalog::from_path(path)?;
        tracing::debug!(path = %path.display(), "validating catalog");
        let summary = catalog.summary().copied();
        Ok((catalog.into_entries(), summary))
    };

    if let Some(path) = args.manifest {
        return from_manifest(path);
    }
    if let Some(path) = args.catalog {
        return from_catalog(path);
    }
    let manifest = settings.manifest_path(None);
    if manifest.is_file() {
        from_manifest(&manifest)
    } else {
        from_catalog(&settings.catalog_path(None))
    }
}

/// Run the gates and report every finding.
pub fn run_validate(settings: &Settings, args: ValidateArgs<'_>) -> Result<bool> {
    let (entries, summary) = load_entries(settings, &args)?;

    let mut report = prebuild_gate(settings, args.preload, args.bootstrap, args.profile)?
        .check(&entries, summary.as_ref());
    if args.post_build || args.staging.is_some() {
        let staging = args
            .staging
            .map_or_else(|| settings.staging_root(), Path::to_path_buf);
        report = report.merge(PostbuildGate::new(args.profile, staging).check(&entries));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.is_success());
    }

    if report.is_success() {
        println!(
            "{} {} entries passed validation",
            "✓".green(),
            entries.len()
        );
    } else {
        print_gate_failures(&report);
        println!(
            "{} validation failed with {} finding(s)",
            "✗".red(),
            report.failures.len()
        );
    }
    Ok(report.is_success())
}
