use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed database name, also used as the file stem.
pub const DB_NAME: &str = "galaxy-fishing-db";

/// Schema version stored in `PRAGMA user_version`.
pub const DB_VERSION: i64 = 1;

/// Open or create the database at `path` and bring its schema up to date.
pub fn open(path: &Path) -> Result<Connection> {
  // Ensure parent directory exists
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }
  }

  let conn = Connection::open(path)
    .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

  prepare(conn)
}

/// Open a private in-memory database with the full schema.
#[cfg(test)]
pub fn open_in_memory() -> Result<Connection> {
  let conn =
    Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
  prepare(conn)
}

/// Get the default database path
pub fn default_path() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(
    data_dir
      .join("galaxy-cache")
      .join(format!("{}.sqlite", DB_NAME)),
  )
}

fn prepare(conn: Connection) -> Result<Connection> {
  // Snapshot and asset stores each hold their own connection to the same file
  conn
    .busy_timeout(Duration::from_secs(5))
    .map_err(|e| eyre!("Failed to set busy timeout: {}", e))?;

  // Asset entries are removed with their cache through ON DELETE CASCADE
  conn
    .execute_batch("PRAGMA foreign_keys = ON")
    .map_err(|e| eyre!("Failed to enable foreign keys: {}", e))?;

  run_migrations(&conn)?;
  Ok(conn)
}

/// Run database migrations
fn run_migrations(conn: &Connection) -> Result<()> {
  let version: i64 = conn
    .query_row("PRAGMA user_version", [], |row| row.get(0))
    .map_err(|e| eyre!("Failed to read schema version: {}", e))?;

  if version > DB_VERSION {
    return Err(eyre!(
      "Database {} has schema version {}, newer than supported version {}",
      DB_NAME,
      version,
      DB_VERSION
    ));
  }

  conn
    .execute_batch(SCHEMA)
    .map_err(|e| eyre!("Failed to run migrations: {}", e))?;

  conn
    .execute_batch(&format!("PRAGMA user_version = {}", DB_VERSION))
    .map_err(|e| eyre!("Failed to write schema version: {}", e))?;

  Ok(())
}

const SCHEMA: &str = r#"
-- Snapshot entries for the game resources (one row per entry)
CREATE TABLE IF NOT EXISTS snapshot_entries (
    store TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    position INTEGER NOT NULL,
    data BLOB NOT NULL,
    written_at TEXT NOT NULL,
    PRIMARY KEY (store, entry_key)
);

CREATE INDEX IF NOT EXISTS idx_snapshot_entries_position
    ON snapshot_entries(store, position);

-- Named asset caches
CREATE TABLE IF NOT EXISTS asset_caches (
    name TEXT PRIMARY KEY,
    created_seq INTEGER NOT NULL
);

-- Cached responses keyed by request URL
CREATE TABLE IF NOT EXISTS asset_entries (
    cache_name TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (cache_name, url),
    FOREIGN KEY (cache_name) REFERENCES asset_caches(name) ON DELETE CASCADE
);
"#;
