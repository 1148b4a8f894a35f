mod commands;
mod config;
mod feed;
mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ics2disc")]
#[command(about = "Mirror the events of an iCalendar feed as Discourse topics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update one topic per feed event
    Sync {
        #[command(flatten)]
        args: SyncArgs,

        /// Lock file guarding against overlapping runs
        #[arg(long)]
        lock_file: Option<PathBuf>,
    },
    /// Show what a sync would do, without changing the forum
    Status {
        #[command(flatten)]
        args: SyncArgs,
    },
}

/// Options shared by `sync` and `status`. Unset options fall back to the
/// environment, then the config file, then built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Feed to read: a file path or an http(s):// or webcal:// URL
    #[arg(long)]
    pub ics: String,

    /// Category for newly created topics
    #[arg(long)]
    pub category_id: Option<u64>,

    /// Timezone for rendering and for floating times (e.g. "Europe/London")
    #[arg(long)]
    pub site_tz: Option<String>,

    /// Extra tags for created topics, comma separated
    #[arg(long, value_delimiter = ',')]
    pub static_tags: Vec<String>,

    /// How many pages of recent topics the fallback scan may read
    #[arg(long)]
    pub scan_pages: Option<u32>,

    /// Match existing topics on start and end only, ignoring location
    #[arg(long)]
    pub time_only_dedupe: bool,

    /// Length of events that have a start but no end (e.g. "1h", "90m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub default_duration: Option<Duration>,

    /// Per-request HTTP timeout (e.g. "60s")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Config file (defaults to ~/.config/ics2disc/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync { args, lock_file } => commands::sync::run(&args, lock_file).await,
        Commands::Status { args } => commands::status::run(&args).await,
    }
}
