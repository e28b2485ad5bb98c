mod app;
mod assets;
mod cache;
mod config;
mod connection;
mod db;
mod game;
mod logging;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use app::{AssetsCommand, Command};

#[derive(Parser, Debug)]
#[command(name = "galaxy-cache")]
#[command(about = "Offline-first asset cache and game data mirror for Galaxy Fishing")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/galaxy-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the network as unavailable and read local snapshots only
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Show the leaderboard
  Leaderboard,
  /// Show market items
  Market,
  /// Show connectivity, snapshot ages and asset caches
  Status,
  /// Delete the local leaderboard and market snapshots
  Purge,
  /// Probe connectivity and print every change until Ctrl-C
  Watch,
  /// Manage the offline asset cache
  #[command(subcommand)]
  Assets(AssetsCmd),
}

#[derive(Subcommand, Debug)]
enum AssetsCmd {
  /// Precache the manifest for the configured version
  Install,
  /// Drop caches of other versions
  Activate,
  /// Answer one request through the cache
  Fetch {
    /// Path relative to the configured origin
    path: String,
    /// Send as a page navigation
    #[arg(long)]
    navigate: bool,
  },
  /// Deliver a control message, e.g. '{"type":"SKIP_WAITING"}'
  Message { json: String },
  /// List caches and their entries
  List,
}

impl From<Cmd> for Command {
  fn from(cmd: Cmd) -> Self {
    match cmd {
      Cmd::Leaderboard => Command::Leaderboard,
      Cmd::Market => Command::Market,
      Cmd::Status => Command::Status,
      Cmd::Purge => Command::Purge,
      Cmd::Watch => Command::Watch,
      Cmd::Assets(assets) => Command::Assets(match assets {
        AssetsCmd::Install => AssetsCommand::Install,
        AssetsCmd::Activate => AssetsCommand::Activate,
        AssetsCmd::Fetch { path, navigate } => AssetsCommand::Fetch { path, navigate },
        AssetsCmd::Message { json } => AssetsCommand::Message { raw: json },
        AssetsCmd::List => AssetsCommand::List,
      }),
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging)?;

  let app = app::App::new(config, args.offline)?;
  app.run(args.command.into()).await?;

  Ok(())
}
