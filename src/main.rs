mod cache;
mod commands;
mod config;
mod notes;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "offnote")]
#[command(about = "Offline-first client for a self-hosted notes API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offnote/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the static asset set into the configured static store
  Install {
    /// Leave the new version waiting instead of activating it
    #[arg(long)]
    no_activate: bool,

    /// Fetch everything but persist nothing, to validate the asset list
    #[arg(long)]
    dry_run: bool,
  },
  /// Claim the configured version set and prune stores of other versions
  Activate,
  /// Show persisted stores and their entry counts
  Status,
  /// Delete every persisted store
  Clear {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
  },
  /// Run a GET request through the cache layer
  Get {
    /// Path (resolved against the server URL) or absolute URL
    target: String,
  },
  /// List notes, served from cache when the server is unreachable
  Notes {
    /// Filter by search term
    #[arg(short, long)]
    search: Option<String>,
  },
  /// Create a note
  Add {
    #[arg(long)]
    title: String,
    #[arg(long)]
    content: String,
    /// Comma-separated tags
    #[arg(long)]
    tags: Option<String>,
  },
  /// Replace a note's title, content, and tags
  Edit {
    id: String,
    #[arg(long)]
    title: String,
    #[arg(long)]
    content: String,
    /// Comma-separated tags
    #[arg(long)]
    tags: Option<String>,
  },
  /// Toggle a note's pin
  Pin { id: String },
  /// Delete a note
  Rm {
    id: String,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = init_tracing(&config)?;

  match args.command {
    Command::Install {
      no_activate,
      dry_run,
    } => commands::install(&config, no_activate, dry_run).await,
    Command::Activate => commands::activate(&config),
    Command::Status => commands::status(&config),
    Command::Clear { yes } => commands::clear(&config, yes),
    Command::Get { target } => commands::get(&config, &target).await,
    Command::Notes { search } => commands::notes(&config, search.as_deref()).await,
    Command::Add {
      title,
      content,
      tags,
    } => commands::add(&config, title, content, tags.as_deref()).await,
    Command::Edit {
      id,
      title,
      content,
      tags,
    } => commands::edit(&config, &id, title, content, tags.as_deref()).await,
    Command::Pin { id } => commands::pin(&config, &id).await,
    Command::Rm { id, yes } => commands::rm(&config, &id, yes).await,
  }
}

/// Diagnostics go to a daily log file under the data dir; stdout stays
/// reserved for command output.
fn init_tracing(config: &config::Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = config.data_dir()?.join("logs");
  let appender = tracing_appender::rolling::daily(log_dir, "offnote.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("offnote=info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
