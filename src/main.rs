mod commands;
mod config;
mod store;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "calfeed")]
#[command(about = "Subscribe to webcal feeds and sync them into a local calendar store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage feed subscriptions
    Subscribe {
        #[command(subcommand)]
        action: commands::subscribe::SubscribeAction,
    },
    /// Force a sync cycle for one subscription, or all of them
    Sync {
        /// Subscription name or id
        name: Option<String>,

        /// Sync every subscription
        #[arg(long, conflicts_with = "name")]
        all: bool,
    },
    /// Run the background sync scheduler until interrupted
    Watch,
    /// List events in a window, with recurring events expanded
    Events {
        /// Window start (e.g. "2025-03-20" or "2025-03-20T09:00"); defaults to now
        #[arg(long)]
        from: Option<String>,

        /// Window end; defaults to one week after the start
        #[arg(long)]
        to: Option<String>,

        /// Emit JSON instead of a listing
        #[arg(long)]
        json: bool,
    },
    /// Create a local event
    Add {
        /// Event title
        title: String,

        /// Start date/time (e.g. "2025-03-20" or "2025-03-20T15:00")
        #[arg(short, long)]
        start: String,

        /// End date/time
        #[arg(short, long, conflicts_with = "duration")]
        end: Option<String>,

        /// Duration (e.g. "30m", "1h", "2h30m")
        #[arg(short, long)]
        duration: Option<String>,

        /// Recurrence rule (e.g. "FREQ=WEEKLY;BYDAY=MO")
        #[arg(long)]
        rrule: Option<String>,

        /// All-day event
        #[arg(long)]
        all_day: bool,
    },
    /// Import events from an .ics file (create-or-update; never deletes)
    Import {
        /// Path to the .ics file
        file: PathBuf,
    },
    /// Export all stored events as a single .ics document
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("calfeed=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Subscribe { action } => commands::subscribe::run(action).await,
        Commands::Sync { name, all } => commands::sync::run(name, all).await,
        Commands::Watch => commands::watch::run().await,
        Commands::Events { from, to, json } => commands::events::run(from, to, json).await,
        Commands::Add {
            title,
            start,
            end,
            duration,
            rrule,
            all_day,
        } => commands::add::run(title, start, end, duration, rrule, all_day).await,
        Commands::Import { file } => commands::import::run(file).await,
        Commands::Export { out } => commands::export::run(out).await,
    }
}
