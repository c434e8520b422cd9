//! Catalog entry builders.
//!
//! ```
//! use pgext_test_utils::catalog::EntryBuilder;
//!
//! let entry = EntryBuilder::git_ref("vector", "https://github.com/pgvector/pgvector.git", "abc")
//!     .depends_on("base")
//!     .build();
//! assert!(entry.dependencies.contains("base"));
//! ```

use pgext_catalog::entry::{
    Backend, BuildSpec, CatalogEntry, EntryKind, RuntimeSpec, Source,
};

/// Fluent builder for [`CatalogEntry`] values in tests.
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    entry: CatalogEntry,
}

impl EntryBuilder {
    fn with_source(name: &str, source: Source, build: Option<BuildSpec>) -> Self {
        Self {
            entry: CatalogEntry {
                name: name.to_string(),
                display_name: None,
                kind: EntryKind::Extension,
                category: "test".to_string(),
                source,
                build,
                runtime: RuntimeSpec::default(),
                dependencies: Default::default(),
                install_via: None,
                enabled: true,
                disabled_reason: None,
                enabled_in_regression: false,
            },
        }
    }

    /// A pgxs extension pinned to `git_ref`.
    pub fn git_ref(name: &str, repository: &str, git_ref: &str) -> Self {
        Self::with_source(
            name,
            Source::GitRef {
                repository: repository.to_string(),
                git_ref: git_ref.to_string(),
            },
            Some(BuildSpec::new(Backend::Pgxs)),
        )
    }

    /// A pgxs extension tracking `tag`.
    pub fn git_tag(name: &str, repository: &str, tag: &str) -> Self {
        Self::with_source(
            name,
            Source::GitTag {
                repository: repository.to_string(),
                tag: tag.to_string(),
            },
            Some(BuildSpec::new(Backend::Pgxs)),
        )
    }

    /// A builtin extension.
    pub fn builtin(name: &str) -> Self {
        let mut builder = Self::with_source(name, Source::Builtin, None);
        builder.entry.kind = EntryKind::Builtin;
        builder
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        let build = self.entry.build.get_or_insert_with(|| BuildSpec::new(Backend::Pgxs));
        build.backend = backend;
        self
    }

    /// Use the `script` backend running `script` from the source root.
    pub fn script(self, script: &str) -> Self {
        self.backend(Backend::Script {
            script: script.to_string(),
        })
    }

    pub fn patch(mut self, rule: &str) -> Self {
        if let Some(build) = self.entry.build.as_mut() {
            build.patches.push(rule.to_string());
        }
        self
    }

    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.entry.kind = kind;
        self
    }

    pub fn depends_on(mut self, name: &str) -> Self {
        self.entry.dependencies.insert(name.to_string());
        self
    }

    pub fn disabled(mut self, reason: &str) -> Self {
        self.entry.enabled = false;
        self.entry.disabled_reason = Some(reason.to_string());
        self
    }

    pub fn enabled_in_regression(mut self) -> Self {
        self.entry.enabled_in_regression = true;
        self
    }

    pub fn install_via(mut self, package: &str) -> Self {
        self.entry.install_via = Some(package.to_string());
        self
    }

    /// Mark as preloaded and enabled by default.
    pub fn preload(mut self) -> Self {
        self.entry.runtime.requires_preload = true;
        self.entry.runtime.enabled_by_default = true;
        self
    }

    pub fn preload_library(mut self, library: &str) -> Self {
        self.entry.runtime.preload_library_name = Some(library.to_string());
        self
    }

    pub fn preload_only(mut self) -> Self {
        self.entry.runtime.preload_only = true;
        self
    }

    pub fn enabled_by_default(mut self) -> Self {
        self.entry.runtime.enabled_by_default = true;
        self
    }

    pub fn build(self) -> CatalogEntry {
        self.entry
    }
}
