//! Dependency graph and build sequencing.
//!
//! Edges point from dependent to dependency: if A depends on B, the edge is
//! `A -> B` and B is built first. Ordering uses Kahn's algorithm with a
//! name-sorted ready set, so the same catalog always yields the same plan.
//!
//! # Example
//!
//! ```
//! use pgext_catalog::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_node("vector");
//! graph.add_node("vectorscale");
//! graph.add_edge("vectorscale", "vector");
//!
//! let levels = graph.levels().unwrap();
//! assert_eq!(levels, vec![vec!["vector".to_string()], vec!["vectorscale".to_string()]]);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::entry::{CatalogEntry, Profile};
use crate::error::{Error, Result};
use crate::resolved::ResolvedCatalogEntry;

/// Directed graph of dependencies between catalog entries.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Adjacency list: key depends on each value.
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph over `entries`, keeping only edges whose both ends are
    /// among them. Dependencies outside the set are satisfied elsewhere
    /// (builtin, package-installed) or reported by a separate check.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CatalogEntry>) -> Self {
        let entries: Vec<&CatalogEntry> = entries.into_iter().collect();
        let mut graph = Self::new();
        for entry in &entries {
            graph.add_node(&entry.name);
        }
        for entry in &entries {
            for dep in &entry.dependencies {
                if graph.contains(dep) {
                    graph.add_edge(&entry.name, dep);
                }
            }
        }
        graph
    }

    pub fn add_node(&mut self, id: &str) {
        self.edges.entry(id.to_string()).or_default();
    }

    /// Declare that `from` depends on `to`. Both nodes are created if absent.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(to);
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Direct dependencies of a node, sorted.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .get(id)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Reverse adjacency: for each node, the nodes that depend on it.
    fn dependents(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut dependents: BTreeMap<&str, Vec<&str>> =
            self.edges.keys().map(|k| (k.as_str(), Vec::new())).collect();
        for (from, deps) in &self.edges {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(from.as_str());
            }
        }
        dependents
    }

    /// Group nodes into dependency levels.
    ///
    /// Level 0 holds nodes with no dependencies; every other node sits one
    /// level above its deepest dependency. Names inside a level are sorted,
    /// and nodes within a level share no edge, so they may build concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cycle`] naming every node of one cycle, in order.
    pub fn levels(&self) -> Result<Vec<Vec<String>>> {
        let dependents = self.dependents();
        let mut remaining: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut levels = Vec::new();
        let mut ready: Vec<&str> = remaining
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        while !ready.is_empty() {
            for id in &ready {
                remaining.remove(id);
            }
            let mut next = BTreeSet::new();
            for id in &ready {
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(deg) = remaining.get_mut(dependent) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            next.insert(*dependent);
                        }
                    }
                }
            }
            levels.push(ready.iter().map(|s| s.to_string()).collect());
            ready = next.into_iter().collect();
        }

        if !remaining.is_empty() {
            let unresolved: BTreeSet<&str> = remaining.keys().copied().collect();
            return Err(Error::Cycle {
                path: self.find_cycle(&unresolved),
            });
        }
        Ok(levels)
    }

    /// Flat dependency-first order: the levels concatenated.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        Ok(self.levels()?.into_iter().flatten().collect())
    }

    /// Walk dependency edges inside `unresolved` until a node repeats.
    ///
    /// Every node left over by Kahn's algorithm still has a dependency in the
    /// left-over set, so the walk cannot dead-end. Starting from the smallest
    /// name and always following the smallest dependency keeps the reported
    /// path deterministic.
    fn find_cycle(&self, unresolved: &BTreeSet<&str>) -> Vec<String> {
        let Some(&start) = unresolved.iter().next() else {
            return Vec::new();
        };
        let mut path: Vec<&str> = Vec::new();
        let mut position: BTreeMap<&str, usize> = BTreeMap::new();
        let mut current = start;
        loop {
            if let Some(&idx) = position.get(current) {
                let cycle = &path[idx..];
                // Rotate so the smallest name leads
                let lead = cycle
                    .iter()
                    .enumerate()
                    .min_by_key(|&(_, name)| *name)
                    .map_or(0, |(i, _)| i);
                return cycle[lead..]
                    .iter()
                    .chain(&cycle[..lead])
                    .map(|s| s.to_string())
                    .collect();
            }
            position.insert(current, path.len());
            path.push(current);
            let next = self
                .edges
                .get(current)
                .and_then(|deps| deps.iter().find(|d| unresolved.contains(d.as_str())));
            match next {
                Some(dep) => current = dep.as_str(),
                None => return path.iter().map(|s| s.to_string()).collect(),
            }
        }
    }
}

/// Anything that wraps a catalog entry can be sequenced.
pub trait Planned {
    fn catalog_entry(&self) -> &CatalogEntry;
}

impl Planned for CatalogEntry {
    fn catalog_entry(&self) -> &CatalogEntry {
        self
    }
}

impl Planned for ResolvedCatalogEntry {
    fn catalog_entry(&self) -> &CatalogEntry {
        &self.entry
    }
}

/// An ordered, level-grouped sequence of entries to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan<T> {
    levels: Vec<Vec<T>>,
}

impl<T: Planned> BuildPlan<T> {
    /// Entries in build order (levels concatenated).
    pub fn steps(&self) -> impl Iterator<Item = &T> {
        self.levels.iter().flatten()
    }

    pub fn levels(&self) -> &[Vec<T>] {
        &self.levels
    }

    pub fn into_levels(self) -> Vec<Vec<T>> {
        self.levels
    }

    /// Entry names in build order.
    pub fn names(&self) -> Vec<&str> {
        self.steps()
            .map(|s| s.catalog_entry().name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check that every dependency of every entry names one of `entries`.
///
/// Returns all violations, in entry order then missing name.
pub fn unknown_dependencies<'a, I>(entries: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a CatalogEntry>,
    I::IntoIter: Clone,
{
    let entries = entries.into_iter();
    let known: BTreeSet<&str> = entries.clone().map(|e| e.name.as_str()).collect();
    entries
        .flat_map(|entry| {
            entry
                .dependencies
                .iter()
                .filter(|dep| !known.contains(dep.as_str()))
                .map(|dep| (entry.name.clone(), dep.clone()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Order the entries that need a build step into a [`BuildPlan`].
///
/// Only entries enabled under `profile`, not builtin and not
/// package-installed are planned. Dependencies are looked up in the full
/// set: a missing name fails with [`Error::UnknownDependency`] before any
/// ordering is attempted, a dependency disabled under `profile` fails with
/// [`Error::DisabledDependency`], and a cycle among planned entries fails
/// with [`Error::Cycle`].
pub fn sequence<T: Planned + Clone>(entries: &[T], profile: Profile) -> Result<BuildPlan<T>> {
    let known: BTreeMap<&str, &CatalogEntry> = entries
        .iter()
        .map(|e| (e.catalog_entry().name.as_str(), e.catalog_entry()))
        .collect();

    let planned: BTreeMap<&str, &T> = entries
        .iter()
        .filter(|e| {
            let entry = e.catalog_entry();
            entry.is_enabled(profile) && entry.needs_build()
        })
        .map(|e| (e.catalog_entry().name.as_str(), e))
        .collect();

    for item in planned.values() {
        let entry = item.catalog_entry();
        if let Some(missing) = entry.dependencies.iter().find(|d| !known.contains_key(d.as_str())) {
            return Err(Error::UnknownDependency {
                entry: entry.name.clone(),
                missing: missing.clone(),
            });
        }
    }

    for item in planned.values() {
        let entry = item.catalog_entry();
        let disabled = entry
            .dependencies
            .iter()
            .find(|d| known.get(d.as_str()).is_some_and(|dep| !dep.is_enabled(profile)));
        if let Some(dependency) = disabled {
            return Err(Error::DisabledDependency {
                entry: entry.name.clone(),
                dependency: dependency.clone(),
            });
        }
    }

    let graph = DependencyGraph::from_entries(planned.values().map(|e| e.catalog_entry()));
    let levels = graph
        .levels()?
        .into_iter()
        .map(|level| {
            level
                .iter()
                .filter_map(|name| planned.get(name.as_str()).map(|e| (*e).clone()))
                .collect()
        })
        .collect();

    let plan = BuildPlan { levels };
    tracing::debug!(steps = plan.len(), levels = plan.levels().len(), "sequenced build plan");
    Ok(plan)
}
