//! Snapshot storage trait and SQLite implementation.

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::Resource;
use crate::db;

/// Trait for snapshot storage backends.
///
/// Every save is a full replacement of the store's previous contents.
pub trait SnapshotStore: Send + Sync {
  /// Replace the stored snapshot with `entries`.
  fn save<T: Resource>(&self, entries: &[T]) -> Result<()>;

  /// Read the stored snapshot, ordered by `Resource::sort_entries`.
  fn load<T: Resource>(&self) -> Result<Vec<T>>;

  /// When the current snapshot was written, if there is one.
  fn saved_at<T: Resource>(&self) -> Result<Option<DateTime<Utc>>>;

  /// Drop the stored snapshot.
  fn clear<T: Resource>(&self) -> Result<()>;
}

/// SQLite-based snapshot storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the store in the database file at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      conn: Mutex::new(db::open(path)?),
    })
  }

  /// Open a throwaway in-memory store.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    Ok(Self {
      conn: Mutex::new(db::open_in_memory()?),
    })
  }
}

impl SnapshotStore for SqliteStorage {
  fn save<T: Resource>(&self, entries: &[T]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let store = T::store_name();
    let written_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // Clear existing data
    tx.execute("DELETE FROM snapshot_entries WHERE store = ?", params![store])
      .map_err(|e| eyre!("Failed to clear {} store: {}", store, e))?;

    for (position, entry) in entries.iter().enumerate() {
      let entry_key = entry.entry_key().unwrap_or_else(|| position.to_string());
      let data =
        serde_json::to_vec(entry).map_err(|e| eyre!("Failed to serialize entry: {}", e))?;

      // A repeated key replaces the earlier entry from the same save
      tx.execute(
        "INSERT OR REPLACE INTO snapshot_entries (store, entry_key, position, data, written_at)
         VALUES (?, ?, ?, ?, ?)",
        params![store, entry_key, position as i64, data, written_at],
      )
      .map_err(|e| eyre!("Failed to store {} entry: {}", store, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn load<T: Resource>(&self) -> Result<Vec<T>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let store = T::store_name();

    let mut stmt = conn
      .prepare("SELECT data FROM snapshot_entries WHERE store = ? ORDER BY position")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<Vec<u8>> = stmt
      .query_map(params![store], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query {} store: {}", store, e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read {} entry: {}", store, e))?;

    let mut entries: Vec<T> = rows
      .iter()
      .filter_map(|data| match serde_json::from_slice(data) {
        Ok(entry) => Some(entry),
        Err(e) => {
          tracing::warn!(store, error = %e, "skipping unreadable snapshot entry");
          None
        }
      })
      .collect();

    T::sort_entries(&mut entries);
    Ok(entries)
  }

  fn saved_at<T: Resource>(&self) -> Result<Option<DateTime<Utc>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let written_at: Option<String> = conn
      .query_row(
        "SELECT MAX(written_at) FROM snapshot_entries WHERE store = ?",
        params![T::store_name()],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query snapshot timestamp: {}", e))?
      .flatten();

    written_at.as_deref().map(parse_datetime).transpose()
  }

  fn clear<T: Resource>(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM snapshot_entries WHERE store = ?",
        params![T::store_name()],
      )
      .map_err(|e| eyre!("Failed to clear {} store: {}", T::store_name(), e))?;

    Ok(())
  }
}

/// Parse an RFC 3339 timestamp written by `save`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
