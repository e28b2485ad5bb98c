//! Game client that reads through the local snapshot cache.

use crate::cache::{CacheLayer, Resource, Snapshot, SnapshotStore, SqliteStorage};
use crate::connection::ConnectivitySignal;

use super::client::GameApiClient;
use super::types::{LeaderboardEntry, MarketItem};

/// Game data client with offline support.
///
/// Reads never fail: the caller always gets the freshest data available,
/// or an empty collection when nothing was ever saved.
pub struct CachedGameClient<S: SnapshotStore = SqliteStorage> {
  inner: GameApiClient,
  cache: CacheLayer<S>,
}

impl<S: SnapshotStore> CachedGameClient<S> {
  pub fn new(inner: GameApiClient, storage: S, connection: ConnectivitySignal) -> Self {
    Self {
      inner,
      cache: CacheLayer::new(storage, connection),
    }
  }

  /// Leaderboard. Stored snapshots come back sorted ascending by rank.
  pub async fn get_leaderboard(&self) -> Snapshot<Vec<LeaderboardEntry>> {
    self.get_resource().await
  }

  /// Market items.
  pub async fn get_market(&self) -> Snapshot<Vec<MarketItem>> {
    self.get_resource().await
  }

  async fn get_resource<T: Resource>(&self) -> Snapshot<Vec<T>> {
    self
      .cache
      .read_through(|| {
        let inner = self.inner.clone();
        async move {
          let envelope = inner.get_json::<T::Envelope>(T::endpoint()).await?;
          Ok(T::from_envelope(envelope))
        }
      })
      .await
  }

  #[cfg(test)]
  pub fn storage(&self) -> &S {
    self.cache.storage()
  }
}

impl<S: SnapshotStore> Clone for CachedGameClient<S> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
      cache: self.cache.clone(),
    }
  }
}
