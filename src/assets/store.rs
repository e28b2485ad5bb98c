//! Named, versioned response caches backed by SQLite.

use chrono::{SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::types::AssetResponse;
use crate::db;

/// Response cache storage, one namespace per cache name.
pub struct AssetStore {
  conn: Mutex<Connection>,
}

impl AssetStore {
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      conn: Mutex::new(db::open(path)?),
    })
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    Ok(Self {
      conn: Mutex::new(db::open_in_memory()?),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Cache names in creation order.
  pub fn keys(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM asset_caches ORDER BY created_seq")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;
    Ok(names)
  }

  /// Delete a cache and, through the cascade, everything in it.
  /// Returns whether it existed.
  pub fn delete(&self, name: &str) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute("DELETE FROM asset_caches WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;
    Ok(removed > 0)
  }

  pub fn contains(&self, name: &str, url: &str) -> Result<bool> {
    let conn = self.lock()?;
    let found = conn
      .query_row(
        "SELECT 1 FROM asset_entries WHERE cache_name = ? AND url = ?",
        params![name, url],
        |_| Ok(()),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", url, e))?;
    Ok(found.is_some())
  }

  /// Store one response, replacing any previous one for the same URL.
  pub fn put(&self, name: &str, url: &str, response: &AssetResponse) -> Result<()> {
    self.put_all(name, &[(url.to_string(), response.clone())])
  }

  /// Store several responses in one transaction; either all land or none do.
  pub fn put_all(&self, name: &str, entries: &[(String, AssetResponse)]) -> Result<()> {
    let mut conn = self.lock()?;
    let cached_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO asset_caches (name, created_seq)
       VALUES (?, (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM asset_caches))",
      params![name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;

    for (url, response) in entries {
      tx.execute(
        "INSERT OR REPLACE INTO asset_entries (cache_name, url, status, content_type, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          name,
          url,
          response.status,
          response.content_type,
          response.body,
          cached_at
        ],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", url, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  /// Look `url` up in every cache, oldest cache first.
  pub fn match_url(&self, url: &str) -> Result<Option<AssetResponse>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT e.status, e.content_type, e.body FROM asset_entries e
         INNER JOIN asset_caches c ON c.name = e.cache_name
         WHERE e.url = ?
         ORDER BY c.created_seq
         LIMIT 1",
        params![url],
        |row| {
          Ok(AssetResponse {
            status: row.get(0)?,
            content_type: row.get(1)?,
            body: row.get(2)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", url, e))
  }

  /// URLs stored in the named cache.
  pub fn entries(&self, name: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT url FROM asset_entries WHERE cache_name = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let urls = stmt
      .query_map(params![name], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache {}: {}", name, e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cached url: {}", e))?;
    Ok(urls)
  }
}
