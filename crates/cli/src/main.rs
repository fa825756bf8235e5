//! `pointdown` -- edit Jira story points from the terminal.
//!
//! Lists the items of the current sprint and saves edits to them. Saves
//! re-read the remote value first, replay the local change on top of any
//! concurrent edit, and hold a short lease on the issue while writing so
//! that two pointdown users never overwrite each other.
//!
//! Configuration comes from flags, the environment and `.env`; see
//! [`config`] for the variables.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pointdown_tracker::TrackerApi;

mod commands;
mod config;

use config::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pointdown=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "pointdown failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let api = Arc::new(TrackerApi::new(cli.connection.tracker_config()?)?);

    tracing::info!(
        base_url = %cli.connection.base_url,
        lock_enabled = cli.sync.lock_enabled,
        "Starting pointdown",
    );

    match cli.command {
        Command::Whoami => commands::whoami(&api).await,
        Command::FindField {
            issue,
            target,
            limit,
        } => commands::find_field(&api, &issue, target, limit).await,
        Command::List => {
            let settings = cli.sync.settings(&cli.connection.email);
            let jql = settings.jql.clone();
            let sync = commands::orchestrator(api, settings);
            commands::list(&sync, &jql).await
        }
        Command::Save { edits } => {
            let settings = cli.sync.settings(&cli.connection.email);
            let sync = commands::orchestrator(api, settings);
            commands::save(&sync, &edits).await
        }
    }
}
