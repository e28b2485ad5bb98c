//! Read-through layer that puts the network in front of the local snapshot.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::storage::SnapshotStore;
use super::traits::{Resource, Snapshot};
use crate::connection::ConnectivitySignal;

/// Cache layer that decides between network and local snapshot.
///
/// Reads never fail: when the network is unavailable or errors, the last saved
/// snapshot is served instead, and when that cannot be read either the caller
/// gets an empty collection.
pub struct CacheLayer<S: SnapshotStore> {
  storage: Arc<S>,
  connection: ConnectivitySignal,
}

impl<S: SnapshotStore> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S, connection: ConnectivitySignal) -> Self {
    Self {
      storage: Arc::new(storage),
      connection,
    }
  }

  /// Access the underlying storage.
  #[cfg(test)]
  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Network-first read with snapshot fallback.
  ///
  /// 1. Offline - return the stored snapshot without calling `fetcher`
  /// 2. Online - fetch, replace the stored snapshot, return the fresh data
  /// 3. Fetch failed - return the stored snapshot
  pub async fn read_through<T, F, Fut>(&self, fetcher: F) -> Snapshot<Vec<T>>
  where
    T: Resource,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    let store = T::store_name();

    if !self.connection.snapshot().is_online {
      debug!(store, "offline, reading local snapshot");
      let (data, saved_at) = self.read_local::<T>();
      return Snapshot::offline(data, saved_at);
    }

    match fetcher().await {
      Ok(data) => {
        // A failed save must not hide data we already have in hand
        let saved_at = match self.storage.save(&data) {
          Ok(()) => self.storage.saved_at::<T>().ok().flatten(),
          Err(e) => {
            error!(store, error = %e, "failed to save snapshot");
            None
          }
        };
        Snapshot::from_network(data, saved_at)
      }
      Err(e) => {
        warn!(store, error = %e, "fetch failed, falling back to cached data");
        let (data, saved_at) = self.read_local::<T>();
        Snapshot::fallback(data, saved_at)
      }
    }
  }

  /// Read the stored snapshot, degrading to an empty set on storage errors.
  fn read_local<T: Resource>(&self) -> (Vec<T>, Option<chrono::DateTime<chrono::Utc>>) {
    let store = T::store_name();

    let data = self.storage.load::<T>().unwrap_or_else(|e| {
      error!(store, error = %e, "failed to read snapshot");
      Vec::new()
    });
    let saved_at = self.storage.saved_at::<T>().unwrap_or_else(|e| {
      error!(store, error = %e, "failed to read snapshot timestamp");
      None
    });

    (data, saved_at)
  }
}

impl<S: SnapshotStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      connection: self.connection.clone(),
    }
  }
}
