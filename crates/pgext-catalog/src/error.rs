/// Errors that can occur while loading, validating or sequencing the catalog.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A catalog entry is missing a required field or carries an invalid value.
    #[error("schema error in entry '{entry}', field '{field}': {reason}")]
    Schema {
        entry: String,
        field: String,
        reason: String,
    },

    /// Two entries share the same name.
    #[error("duplicate catalog entry '{name}'")]
    DuplicateEntry { name: String },

    /// An entry depends on a name that is not in the catalog.
    #[error("entry '{entry}' depends on unknown entry '{missing}'")]
    UnknownDependency { entry: String, missing: String },

    /// An entry planned for a build depends on an entry that is disabled
    /// under the active profile.
    #[error("entry '{entry}' depends on '{dependency}', which is disabled in this profile")]
    DisabledDependency { entry: String, dependency: String },

    /// The dependency relation contains a cycle. `path` lists every node in
    /// the cycle in dependency order.
    #[error("dependency cycle: {}", format_cycle(.path))]
    Cycle { path: Vec<String> },

    /// The manifest artifact is structurally inconsistent.
    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    /// Filesystem or document parse failure.
    #[error(transparent)]
    Fs(#[from] pgext_fs::Error),
}

fn format_cycle(path: &[String]) -> String {
    match path.first() {
        Some(first) => format!("{} -> {}", path.join(" -> "), first),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn schema(entry: impl Into<String>, field: &str, reason: impl Into<String>) -> Self {
        Self::Schema {
            entry: entry.into(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_closes_the_loop() {
        let err = Error::Cycle {
            path: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> c -> a");
    }

    #[test]
    fn schema_message_names_entry_and_field() {
        let err = Error::schema("pg_cron", "source.tag", "required for git-tag sources");
        assert_eq!(
            err.to_string(),
            "schema error in entry 'pg_cron', field 'source.tag': required for git-tag sources"
        );
    }
}
