use crate::assets::{
  AssetCache, AssetCacheOptions, AssetRequest, AssetStore, ControlMessage, HttpNetwork,
  RequestMode, RoutePolicy,
};
use crate::cache::{CacheSource, Snapshot, SnapshotStore, SqliteStorage};
use crate::config::Config;
use crate::connection::{ConnectionState, ConnectivityMonitor, ConnectivitySignal};
use crate::game::cached_client::CachedGameClient;
use crate::game::client::GameApiClient;
use crate::game::types::{LeaderboardEntry, MarketItem};
use chrono::{DateTime, Local, Utc};
use color_eyre::{eyre::eyre, Result};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Top-level command
#[derive(Debug, Clone)]
pub enum Command {
  Leaderboard,
  Market,
  Status,
  Purge,
  Watch,
  Assets(AssetsCommand),
}

#[derive(Debug, Clone)]
pub enum AssetsCommand {
  Install,
  Activate,
  Fetch { path: String, navigate: bool },
  Message { raw: String },
  List,
}

/// Main application state
pub struct App {
  config: Config,
  db_path: PathBuf,
  api: GameApiClient,
  connection: ConnectivitySignal,
  force_offline: bool,
}

impl App {
  pub fn new(config: Config, force_offline: bool) -> Result<Self> {
    let db_path = match &config.storage.path {
      Some(path) => path.clone(),
      None => crate::db::default_path()?,
    };
    let api = GameApiClient::new(&config.api)?;
    let connection = ConnectivitySignal::new(!force_offline, config.connection.reconnect_flag());

    Ok(Self {
      config,
      db_path,
      api,
      connection,
      force_offline,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Leaderboard => {
        self.check_connectivity().await;
        let snapshot = self.game_client()?.get_leaderboard().await;
        print!("{}", render_leaderboard(&snapshot));
      }
      Command::Market => {
        self.check_connectivity().await;
        let snapshot = self.game_client()?.get_market().await;
        print!("{}", render_market(&snapshot));
      }
      Command::Status => self.status()?,
      Command::Purge => {
        let storage = SqliteStorage::open(&self.db_path)?;
        storage.clear::<LeaderboardEntry>()?;
        storage.clear::<MarketItem>()?;
        println!("Cleared local snapshots in {}", self.db_path.display());
      }
      Command::Watch => self.watch().await?,
      Command::Assets(command) => self.run_assets(command).await?,
    }
    Ok(())
  }

  /// Take one reachability reading before a one-shot read.
  async fn check_connectivity(&self) {
    if self.force_offline {
      return;
    }
    let online = self.api.probe().await;
    debug!(online, "connectivity check");
    self.connection.update(online);
  }

  fn game_client(&self) -> Result<CachedGameClient> {
    let storage = SqliteStorage::open(&self.db_path)?;
    Ok(CachedGameClient::new(
      self.api.clone(),
      storage,
      self.connection.clone(),
    ))
  }

  fn asset_cache(&self) -> Result<AssetCache<HttpNetwork>> {
    let assets = &self.config.assets;
    let origin = Url::parse(&assets.origin)
      .map_err(|e| eyre!("Invalid asset origin {}: {}", assets.origin, e))?;

    let options = AssetCacheOptions {
      version: assets.cache_version.clone(),
      policy: RoutePolicy::new(origin, assets.spa_routes.clone(), assets.precache.clone()),
      precache: assets.precache.clone(),
      shell: assets.shell.clone(),
      skip_waiting: assets.skip_waiting,
    };
    let store = Arc::new(AssetStore::open(&self.db_path)?);
    let network = HttpNetwork::new(self.config.api.timeout())?;

    AssetCache::new(store, network, options)
  }

  fn status(&self) -> Result<()> {
    let storage = SqliteStorage::open(&self.db_path)?;
    let store = AssetStore::open(&self.db_path)?;

    println!("Database:    {}", self.db_path.display());
    println!("Connection:  {}", describe_connection(&self.connection.snapshot()));
    println!(
      "Leaderboard: {}",
      describe_saved(
        storage.load::<LeaderboardEntry>()?.len(),
        storage.saved_at::<LeaderboardEntry>()?
      )
    );
    println!(
      "Market:      {}",
      describe_saved(
        storage.load::<MarketItem>()?.len(),
        storage.saved_at::<MarketItem>()?
      )
    );

    let keys = store.keys()?;
    if keys.is_empty() {
      println!("Asset caches: none");
    } else {
      println!("Asset caches:");
      for name in keys {
        let marker = if name == self.config.assets.cache_version {
          " (current)"
        } else {
          ""
        };
        println!("  {}{}: {} entries", name, marker, store.entries(&name)?.len());
      }
    }
    Ok(())
  }

  async fn watch(&self) -> Result<()> {
    let mut rx = self.connection.subscribe();
    let monitor = ConnectivityMonitor::spawn(
      self.api.clone(),
      self.connection.clone(),
      self.config.connection.probe_interval(),
    );
    info!(url = %self.api.base_url(), "watching connectivity, Ctrl-C to stop");
    println!("{}", describe_connection(&rx.borrow_and_update()));

    loop {
      tokio::select! {
        changed = rx.changed() => {
          if changed.is_err() {
            break;
          }
          println!("{}", describe_connection(&rx.borrow_and_update()));
        }
        _ = tokio::signal::ctrl_c() => break,
      }
    }

    monitor.stop();
    Ok(())
  }

  async fn run_assets(&self, command: AssetsCommand) -> Result<()> {
    let cache = self.asset_cache()?;

    match command {
      AssetsCommand::Install => {
        let fetched = cache.install().await?;
        println!(
          "Installed {} ({} fetched), state: {}",
          cache.version(),
          fetched,
          cache.state()
        );
      }
      AssetsCommand::Activate => {
        let deleted = cache.activate()?;
        println!("Activated {}", cache.version());
        for name in deleted {
          println!("  deleted {}", name);
        }
      }
      AssetsCommand::Fetch { path, navigate } => {
        let url = Url::parse(&self.config.assets.origin)
          .and_then(|origin| origin.join(&path))
          .map_err(|e| eyre!("Invalid request path {}: {}", path, e))?;
        let mode = if navigate {
          RequestMode::Navigate
        } else {
          RequestMode::NoCors
        };

        let response = cache.handle_fetch(&AssetRequest::new(url.clone(), mode)).await;
        println!(
          "{} {} {} ({} bytes)",
          response.status,
          url,
          response.content_type.as_deref().unwrap_or("-"),
          response.body.len()
        );
      }
      AssetsCommand::Message { raw } => {
        let message = ControlMessage::parse(&raw);
        cache.handle_message(message.clone())?;
        println!("Delivered {:?}, state: {}", message, cache.state());
      }
      AssetsCommand::List => {
        let store = AssetStore::open(&self.db_path)?;
        for name in store.keys()? {
          println!("{}", name);
          for url in store.entries(&name)? {
            println!("  {}", url);
          }
        }
      }
    }
    Ok(())
  }
}

fn describe_connection(state: &ConnectionState) -> String {
  match (state.is_online, state.was_offline) {
    (true, true) => "online (just reconnected)".to_string(),
    (true, false) => match state.last_online_time {
      Some(at) => format!("online since {}", format_time(at)),
      None => "online".to_string(),
    },
    (false, _) => "offline".to_string(),
  }
}

fn describe_saved(count: usize, saved_at: Option<DateTime<Utc>>) -> String {
  match saved_at {
    Some(at) => format!("{} entries, saved {}", count, format_time(at)),
    None => "no snapshot".to_string(),
  }
}

fn format_time(at: DateTime<Utc>) -> String {
  at.with_timezone(&Local)
    .format("%Y-%m-%d %H:%M:%S")
    .to_string()
}

fn source_line<T>(snapshot: &Snapshot<T>) -> String {
  match (snapshot.source, snapshot.saved_at) {
    (CacheSource::Network, _) => "Source: network".to_string(),
    (source, Some(at)) => format!("Source: {} (saved {})", source, format_time(at)),
    (source, None) => format!("Source: {} (nothing saved yet)", source),
  }
}

pub fn render_leaderboard(snapshot: &Snapshot<Vec<LeaderboardEntry>>) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}", source_line(snapshot));

  if snapshot.data.is_empty() {
    let _ = writeln!(out, "No leaderboard data");
    return out;
  }

  let _ = writeln!(
    out,
    "{:>4}  {:<20} {:>5} {:>8} {:>8}",
    "RANK", "PLAYER", "LEVEL", "XP", "GOLD"
  );
  for entry in &snapshot.data {
    let name = match &entry.fish_emojis {
      Some(fish) => format!("{} {}", entry.username, fish),
      None => entry.username.clone(),
    };
    let _ = writeln!(
      out,
      "{:>4}  {:<20} {:>5} {:>8} {:>8}",
      entry.rank, name, entry.level, entry.xp, entry.gold
    );
  }
  out
}

pub fn render_market(snapshot: &Snapshot<Vec<MarketItem>>) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}", source_line(snapshot));

  if snapshot.data.is_empty() {
    let _ = writeln!(out, "No market data");
    return out;
  }

  let _ = writeln!(
    out,
    "{:<12} {:<20} {:<10} {:>6}  {}",
    "ID", "NAME", "TYPE", "COST", "DESCRIPTION"
  );
  for item in &snapshot.data {
    let _ = writeln!(
      out,
      "{:<12} {:<20} {:<10} {:>6}  {}",
      item.id, item.name, item.item_type, item.cost, item.description
    );
  }
  out
}
