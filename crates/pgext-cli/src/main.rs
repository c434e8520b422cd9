//! pgext CLI
//!
//! Resolves, plans, builds and validates a PostgreSQL extension catalog.

mod cli;
mod commands;
mod error;
mod logging;
mod settings;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use commands::validate::ValidateArgs;
use error::Result;
use settings::Settings;

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// `Ok(false)` when the command ran but reported failures.
fn run() -> Result<bool> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "pgext", &mut std::io::stdout());
        return Ok(true);
    }

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}: cannot initialise logging: {e}", "warning".yellow());
    }

    let cwd = std::env::current_dir()?;
    let settings = Settings::load(cli.config.as_deref(), &cwd)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute_command(cli.command, settings))
}

async fn execute_command(cmd: Commands, settings: Settings) -> Result<bool> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling outstanding work");
            interrupt.cancel();
        }
    });

    match cmd {
        Commands::Resolve {
            catalog,
            manifest,
            concurrency,
        } => {
            commands::run_resolve(
                &settings,
                catalog.as_deref(),
                manifest.as_deref(),
                concurrency,
                &cancel,
            )
            .await
        }
        Commands::Plan {
            catalog,
            profile,
            json,
        } => commands::run_plan(&settings, catalog.as_deref(), profile.into(), json),
        Commands::Build {
            manifest,
            fail_fast,
            best_effort,
            concurrency,
            profile,
        } => {
            commands::run_build(
                &settings,
                manifest.as_deref(),
                Commands::build_mode(fail_fast, best_effort),
                concurrency,
                profile.into(),
                &cancel,
            )
            .await
        }
        Commands::Validate {
            manifest,
            catalog,
            preload,
            bootstrap,
            post_build,
            staging,
            profile,
            json,
        } => commands::run_validate(
            &settings,
            ValidateArgs {
                manifest: manifest.as_deref(),
                catalog: catalog.as_deref(),
                preload: preload.as_deref(),
                bootstrap: bootstrap.as_deref(),
                post_build,
                staging: staging.as_deref(),
                profile: profile.into(),
                json,
            },
        ),
        Commands::Completions { .. } => Ok(true),
    }
}
