//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use pgext_build::BuildMode;
use pgext_catalog::Profile;

/// pgext - Build a curated PostgreSQL extension catalog reproducibly
#[derive(Parser, Debug)]
#[command(name = "pgext")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (pgext.toml, .json or .yaml)
    #[arg(short, long, global = true, env = "PGEXT_CONFIG")]
    pub config: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Enablement profile
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileArg {
    Production,
    Regression,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Production => Profile::Production,
            ProfileArg::Regression => Profile::Regression,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Resolve every git tag to a commit and write the manifest
    Resolve {
        /// Catalog to resolve
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Where to write the manifest
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Concurrent remote lookups
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the dependency-ordered build plan
    Plan {
        /// Catalog to plan
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Enablement profile
        #[arg(long, value_enum, default_value = "production")]
        profile: ProfileArg,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Build every enabled entry of the manifest into the staging tree
    ///
    /// Runs the pre-build gate, builds level by level, records build
    /// metadata in the manifest and runs the post-build gate.
    ///
    /// Examples:
    ///   pgext build                          # stop at the first failure
    ///   pgext build --best-effort            # build everything that can be built
    ///   pgext build --concurrency 4 --profile regression
    Build {
        /// Manifest to build from
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Cancel everything at the first failing entry (default)
        #[arg(long, conflicts_with = "best_effort")]
        fail_fast: bool,

        /// Keep building entries that do not depend on a failure
        #[arg(long)]
        best_effort: bool,

        /// Entries built at the same time
        #[arg(long)]
        concurrency: Option<usize>,

        /// Enablement profile
        #[arg(long, value_enum, default_value = "production")]
        profile: ProfileArg,
    },

    /// Run the validation gates without building
    ///
    /// Checks the manifest when it exists, otherwise the catalog.
    ///
    /// Examples:
    ///   pgext validate
    ///   pgext validate --preload docker/preload.list --bootstrap docker/initdb/extensions.sql
    ///   pgext validate --post-build --json
    Validate {
        /// Manifest to validate
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Catalog to validate when no manifest exists
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Runtime preload descriptor
        #[arg(long)]
        preload: Option<PathBuf>,

        /// Bootstrap activation descriptor
        #[arg(long)]
        bootstrap: Option<PathBuf>,

        /// Also check the staging tree
        #[arg(long)]
        post_build: bool,

        /// Staging root to check (implies --post-build)
        #[arg(long)]
        staging: Option<PathBuf>,

        /// Enablement profile
        #[arg(long, value_enum, default_value = "production")]
        profile: ProfileArg,

        /// Output as JSON for CI
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    ///
    /// Examples:
    ///   pgext completions bash > ~/.local/share/bash-completion/completions/pgext
    ///   pgext completions zsh > ~/.zfunc/_pgext
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Build mode selected by `--fail-fast` / `--best-effort`.
    pub fn build_mode(fail_fast: bool, best_effort: bool) -> BuildMode {
        if best_effort && !fail_fast {
            BuildMode::BestEffort
        } else {
            BuildMode::FailFast
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_build_defaults() {
        let cli = Cli::parse_from(["pgext", "build"]);
        match cli.command {
            Commands::Build {
                fail_fast,
                best_effort,
                concurrency,
                profile,
                ..
            } => {
                assert_eq!(Commands::build_mode(fail_fast, best_effort), BuildMode::FailFast);
                assert_eq!(concurrency, None);
                assert_eq!(profile, ProfileArg::Production);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_best_effort_build() {
        let cli = Cli::parse_from(["pgext", "build", "--best-effort", "--concurrency", "4"]);
        match cli.command {
            Commands::Build {
                fail_fast,
                best_effort,
                concurrency,
                ..
            } => {
                assert_eq!(Commands::build_mode(fail_fast, best_effort), BuildMode::BestEffort);
                assert_eq!(concurrency, Some(4));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fail_fast_conflicts_with_best_effort() {
        let result = Cli::try_parse_from(["pgext", "build", "--fail-fast", "--best-effort"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_validate_with_descriptors() {
        let cli = Cli::parse_from([
            "pgext",
            "validate",
            "--preload",
            "preload.list",
            "--profile",
            "regression",
            "--json",
        ]);
        match cli.command {
            Commands::Validate {
                preload,
                profile,
                json,
                ..
            } => {
                assert_eq!(preload, Some(PathBuf::from("preload.list")));
                assert_eq!(Profile::from(profile), Profile::Regression);
                assert!(json);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::parse_from(["pgext", "plan", "--config", "ci/pgext.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("ci/pgext.toml")));
        assert!(matches!(cli.command, Commands::Plan { json: false, .. }));
    }

    #[test]
    fn parse_completions_command() {
        let cli = Cli::parse_from(["pgext", "completions", "bash"]);
        assert!(matches!(cli.command, Commands::Completions { .. }));
    }
}
