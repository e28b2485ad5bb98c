use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub storage: StorageConfig,
  pub assets: AssetsConfig,
  pub connection: ConnectionConfig,
  pub logging: LoggingConfig,
}

/// Upper bound for `api.retry`.
pub const MAX_RETRY: u32 = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Per-request timeout in milliseconds
  pub timeout_ms: u64,
  /// Extra attempts after the first one, made immediately
  pub retry: u32,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api-game.bloque.app/game".to_string(),
      timeout_ms: 5000,
      retry: 1,
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Database file (defaults to $XDG_DATA_HOME/galaxy-cache/galaxy-fishing-db.sqlite)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
  /// Origin the application shell is served from
  pub origin: String,
  /// Version tag; bumping it discards every older cache on activate
  pub cache_version: String,
  /// Paths fetched and stored on install
  pub precache: Vec<String>,
  /// Client-side routes answered with the shell
  pub spa_routes: Vec<String>,
  pub shell: String,
  /// Activate right after install instead of waiting for SKIP_WAITING
  pub skip_waiting: bool,
}

impl Default for AssetsConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:5173".to_string(),
      cache_version: "fishing-game-cache-v2".to_string(),
      precache: [
        "/",
        "/index.html",
        "/fish-icon.svg",
        "/vite.svg",
        "/leaderboard",
        "/market",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      spa_routes: ["/", "/leaderboard", "/market"]
        .into_iter()
        .map(String::from)
        .collect(),
      shell: "/index.html".to_string(),
      skip_waiting: true,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
  pub probe_interval_secs: u64,
  /// How long the "just reconnected" flag stays set
  pub reconnect_flag_secs: u64,
}

impl Default for ConnectionConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: 10,
      reconnect_flag_secs: 5,
    }
  }
}

impl ConnectionConfig {
  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs)
  }

  pub fn reconnect_flag(&self) -> Duration {
    Duration::from_secs(self.reconnect_flag_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter used when RUST_LOG is not set
  pub level: String,
  /// Optional log file, rotated daily
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./galaxy-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/galaxy-cache/config.yaml
  /// 4. Built-in defaults
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_env_overrides())
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("galaxy-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("galaxy-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.api.retry > MAX_RETRY {
      return Err(eyre!(
        "api.retry is {}, at most {} is allowed",
        self.api.retry,
        MAX_RETRY
      ));
    }
    Ok(())
  }

  /// Apply GALAXY_CACHE_API_URL if set.
  fn with_env_overrides(mut self) -> Self {
    if let Ok(url) = std::env::var("GALAXY_CACHE_API_URL") {
      if !url.trim().is_empty() {
        self.api.base_url = url;
      }
    }
    self
  }
}
