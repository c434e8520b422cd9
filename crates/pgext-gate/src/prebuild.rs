//! Structural checks that need only the catalog and the descriptors.

use std::collections::BTreeSet;

use pgext_catalog::{
    CatalogEntry, CatalogStats, CatalogSummary, DependencyGraph, Profile, unknown_dependencies,
};

use crate::descriptor::DeclaredNames;
use crate::report::{CATALOG_SCOPE, GateFailure, GateKind, GatePass, GateReport};

/// The pre-build gate. Descriptor checks run only for descriptors supplied.
#[derive(Debug, Clone, Default)]
pub struct PrebuildGate {
    profile: Profile,
    preload: Option<DeclaredNames>,
    bootstrap: Option<DeclaredNames>,
}

impl PrebuildGate {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn with_preload(mut self, names: DeclaredNames) -> Self {
        self.preload = Some(names);
        self
    }

    pub fn with_bootstrap(mut self, names: DeclaredNames) -> Self {
        self.bootstrap = Some(names);
        self
    }

    /// Run every check and accumulate the findings.
    pub fn check(&self, entries: &[CatalogEntry], summary: Option<&CatalogSummary>) -> GateReport {
        let mut report = GateReport::new(GatePass::Prebuild);
        self.check_dependencies(entries, &mut report);
        self.check_cycles(entries, &mut report);
        check_disabled_reasons(entries, &mut report);
        if let Some(preload) = &self.preload {
            self.check_preload(entries, preload, &mut report);
        }
        if let Some(bootstrap) = &self.bootstrap {
            self.check_activation(entries, bootstrap, &mut report);
        }
        self.check_counts(entries, summary, &mut report);

        tracing::info!(
            entries = entries.len(),
            failures = report.failures.len(),
            "pre-build gate finished"
        );
        report
    }

    fn check_dependencies(&self, entries: &[CatalogEntry], report: &mut GateReport) {
        for (entry, missing) in unknown_dependencies(entries) {
            report.push(GateFailure::new(
                entry,
                GateKind::UnknownDependency,
                format!("depends on unknown entry '{missing}'"),
            ));
        }

        let disabled: BTreeSet<&str> = entries
            .iter()
            .filter(|e| !e.is_enabled(self.profile))
            .map(|e| e.name.as_str())
            .collect();
        for entry in entries.iter().filter(|e| e.is_enabled(self.profile)) {
            for dep in entry.dependencies.iter().filter(|d| disabled.contains(d.as_str())) {
                report.push(GateFailure::new(
                    entry.name.clone(),
                    GateKind::DisabledDependency,
                    format!("depends on '{dep}', which is disabled in this profile"),
                ));
            }
        }
    }

    fn check_cycles(&self, entries: &[CatalogEntry], report: &mut GateReport) {
        let graph = DependencyGraph::from_entries(entries.iter().filter(|e| e.is_enabled(self.profile)));
        if let Err(pgext_catalog::Error::Cycle { path }) = graph.levels() {
            let mut closed = path.clone();
            if let Some(first) = path.first() {
                closed.push(first.clone());
            }
            report.push(GateFailure::new(
                path.first().cloned().unwrap_or_else(|| CATALOG_SCOPE.to_string()),
                GateKind::Cycle,
                format!("dependency cycle: {}", closed.join(" -> ")),
            ));
        }
    }

    fn check_preload(&self, entries: &[CatalogEntry], preload: &DeclaredNames, report: &mut GateReport) {
        let declared: Vec<&CatalogEntry> = entries
            .iter()
            .filter(|e| {
                e.is_enabled(self.profile) && e.runtime.requires_preload && e.runtime.enabled_by_default
            })
            .collect();

        for entry in &declared {
            let library = entry.library_name();
            if !preload.contains(library) {
                report.push(GateFailure::new(
                    entry.name.clone(),
                    GateKind::PreloadNotDeclared,
                    format!("requires preloading '{library}' but the preload descriptor does not list it"),
                ));
            }
        }

        let libraries: BTreeSet<&str> = declared.iter().map(|e| e.library_name()).collect();
        for name in preload.iter().filter(|n| !libraries.contains(n)) {
            report.push(GateFailure::new(
                name,
                GateKind::PreloadOrphan,
                "listed in the preload descriptor but no enabled catalog entry requires it",
            ));
        }
    }

    fn check_activation(&self, entries: &[CatalogEntry], bootstrap: &DeclaredNames, report: &mut GateReport) {
        for entry in entries
            .iter()
            .filter(|e| e.is_enabled(self.profile) && e.requires_activation())
        {
            if !bootstrap.contains(&entry.name) {
                report.push(GateFailure::new(
                    entry.name.clone(),
                    GateKind::NotActivated,
                    "enabled by default but not activated by the bootstrap descriptor",
                ));
            }
        }
    }

    fn check_counts(&self, entries: &[CatalogEntry], summary: Option<&CatalogSummary>, report: &mut GateReport) {
        let stats = CatalogStats::from_entries(entries, self.profile);
        let mut problems = stats.inconsistencies();
        if let Some(summary) = summary {
            problems.extend(stats.mismatches(summary));
        }
        for problem in problems {
            report.push(GateFailure::new(CATALOG_SCOPE, GateKind::CountMismatch, problem));
        }
    }
}

fn check_disabled_reasons(entries: &[CatalogEntry], report: &mut GateReport) {
    for entry in entries.iter().filter(|e| !e.enabled) {
        let blank = entry
            .disabled_reason
            .as_deref()
            .is_none_or(|r| r.trim().is_empty());
        if blank {
            report.push(GateFailure::new(
                entry.name.clone(),
                GateKind::MissingDisabledReason,
                "disabled without a disabled_reason",
            ));
        }
    }
}
