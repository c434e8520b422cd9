//! Plan command implementation

use std::path::Path;

use colored::Colorize;
use pgext_catalog::{Catalog, CatalogEntry, Profile, sequence};
use serde::Serialize;

use crate::error::Result;
use crate::settings::Settings;

#[derive(Debug, Serialize)]
struct PlanStep<'a> {
    name: &'a str,
    backend: &'a str,
    dependencies: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct PlanOutput<'a> {
    profile: Profile,
    levels: Vec<Vec<PlanStep<'a>>>,
}

fn step(entry: &CatalogEntry) -> PlanStep<'_> {
    PlanStep {
        name: &entry.name,
        backend: entry.build.as_ref().map_or("none", |b| b.backend.name()),
        dependencies: entry.dependencies.iter().map(String::as_str).collect(),
    }
}

/// Print the build plan level by level.
pub fn run_plan(
    settings: &Settings,
    catalog: Option<&Path>,
    profile: Profile,
    json: bool,
) -> Result<bool> {
    let catalog = Catalog::from_path(&settings.catalog_path(catalog))?;
    let entries = catalog.into_entries();
    let plan = sequence(&entries, profile)?;

    if json {
        let output = PlanOutput {
            profile,
            levels: plan
                .levels()
                .iter()
                .map(|level| level.iter().map(step).collect())
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(true);
    }

    println!("{} ({})", "Build plan".bold(), profile.as_str());
    println!();
    if plan.is_empty() {
        println!("  {}", "Nothing to build".dimmed());
        return Ok(true);
    }
    for (index, level) in plan.levels().iter().enumerate() {
        println!("{}:", format!("Level {index}").bold());
        for entry in level {
            let backend = step(entry).backend;
            if entry.dependencies.is_empty() {
                println!("  {} {}", entry.name.cyan(), format!("[{backend}]").dimmed());
            } else {
                let deps: Vec<&str> = entry.dependencies.iter().map(String::as_str).collect();
                println!(
                    "  {} {} after {}",
                    entry.name.cyan(),
                    format!("[{backend}]").dimmed(),
                    deps.join(", ")
                );
            }
        }
    }
    println!();
    println!(
        "{} entries in {} levels",
        plan.len(),
        plan.levels().len()
    );
    Ok(true)
}
