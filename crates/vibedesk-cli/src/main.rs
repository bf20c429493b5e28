//! VibeDesk CLI - schedule alerts, tasks, cached media and playback
//!
//! Works against the same local databases a VibeDesk host uses, so events
//! added here fire in any running session and vice versa.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{AlertCommands, BlobCommands, Cli, Commands, ScheduleCommands, TaskCommands};
use crate::commands::alerts::{run_alerts_test, run_alerts_watch};
use crate::commands::blob::{run_blob_get, run_blob_put};
use crate::commands::common::Context;
use crate::commands::play::run_play;
use crate::commands::schedule::{run_schedule_add, run_schedule_delete, run_schedule_list};
use crate::commands::sync::run_sync;
use crate::commands::tasks::{run_tasks_add, run_tasks_delete, run_tasks_list, run_tasks_toggle};
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "vibedesk=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::new(cli.config, cli.data_dir, &cli.scope, cli.contact)?;

    match cli.command {
        Commands::Blob { command } => match command {
            BlobCommands::Put { key, file } => run_blob_put(&ctx, &key, &file).await?,
            BlobCommands::Get { key, output } => {
                run_blob_get(&ctx, &key, output.as_deref()).await?;
            }
        },
        Commands::Schedule { command } => match command {
            ScheduleCommands::Add { date, time, title } => {
                run_schedule_add(&ctx, date.as_deref(), &time, &title).await?;
            }
            ScheduleCommands::List { json } => run_schedule_list(&ctx, json).await?,
            ScheduleCommands::Delete { id } => run_schedule_delete(&ctx, &id).await?,
        },
        Commands::Tasks { command } => match command {
            TaskCommands::Add { title } => run_tasks_add(&ctx, &title).await?,
            TaskCommands::List { json } => run_tasks_list(&ctx, json).await?,
            TaskCommands::Toggle { id } => run_tasks_toggle(&ctx, &id).await?,
            TaskCommands::Delete { id } => run_tasks_delete(&ctx, &id).await?,
        },
        Commands::Alerts { command } => match command {
            AlertCommands::Watch { notify } => run_alerts_watch(&ctx, notify).await?,
            AlertCommands::Test { notify } => run_alerts_test(&ctx, notify).await?,
        },
        Commands::Play {
            source,
            seconds,
            volume,
        } => run_play(&ctx, &source, seconds, volume).await?,
        Commands::Sync => run_sync(&ctx).await?,
    }

    Ok(())
}
