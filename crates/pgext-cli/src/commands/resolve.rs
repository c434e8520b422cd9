//! Resolve command implementation

use std::path::Path;

use chrono::Utc;
use colored::Colorize;
use pgext_catalog::Catalog;
use pgext_git::{Git2Remote, Resolver};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::settings::Settings;

/// Resolve every catalog entry and write the manifest.
///
/// Nothing is written unless every entry resolved.
pub async fn run_resolve(
    settings: &Settings,
    catalog: Option<&Path>,
    manifest: Option<&Path>,
    concurrency: Option<usize>,
    cancel: &CancellationToken,
) -> Result<bool> {
    let catalog_path = settings.catalog_path(catalog);
    let manifest_path = settings.manifest_path(manifest);
    let catalog = Catalog::from_path(&catalog_path)?;
    let options = settings.resolve_options(concurrency);
    settings.network_timeouts().apply()?;
    let resolver = Resolver::new(
        Git2Remote::new(options.timeout),
        settings.trust.clone(),
        options,
    );

    let report = resolver.resolve_catalog(&catalog, cancel).await;
    if !report.is_success() {
        for failure in &report.failures {
            println!("{} {}", "✗".red(), failure);
        }
        println!(
            "{} {} of {} entries failed to resolve; manifest not written",
            "✗".red(),
            report.failures.len(),
            catalog.len()
        );
        return Ok(false);
    }

    let resolved = report.resolved.len();
    let manifest = report.into_manifest(catalog.summary().copied(), Utc::now())?;
    manifest.save(&manifest_path)?;
    println!(
        "{} Resolved {} entries into {}",
        "✓".green(),
        resolved,
        manifest_path.display()
    );
    Ok(true)
}
