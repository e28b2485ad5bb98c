//! Core traits and types for the snapshot cache.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Trait for remote collections that are mirrored locally as snapshots.
///
/// Each implementor names its local store, its endpoint, and the JSON envelope
/// the endpoint wraps the collection in.
pub trait Resource: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Response body returned by the endpoint
  type Envelope: DeserializeOwned + Send;

  /// Local store name (e.g., "leaderboard")
  fn store_name() -> &'static str;

  /// Endpoint path relative to the API base URL
  fn endpoint() -> &'static str;

  /// Pull the collection out of the response body.
  fn from_envelope(envelope: Self::Envelope) -> Vec<Self>;

  /// Unique key within the store.
  /// Returns None for stores without a natural key; entries are then keyed by position.
  fn entry_key(&self) -> Option<String>;

  /// Order entries for reads. Defaults to insertion order.
  fn sort_entries(_entries: &mut [Self]) {}
}

/// Data returned by the read-through cache, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was written to the local store, if it is known
  pub saved_at: Option<DateTime<Utc>>,
}

impl<T> Snapshot<T> {
  /// Fresh data from the network.
  pub fn from_network(data: T, saved_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      saved_at,
    }
  }

  /// Stored data read because the connectivity signal reported offline.
  pub fn offline(data: T, saved_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      saved_at,
    }
  }

  /// Stored data read because the network attempt failed.
  pub fn fallback(data: T, saved_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Fallback,
      saved_at,
    }
  }
}

/// Indicates where snapshot data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Connectivity signal reported offline, network not attempted
  Offline,
  /// Network attempt failed, serving the last saved snapshot
  Fallback,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Network => write!(f, "network"),
      Self::Offline => write!(f, "offline cache"),
      Self::Fallback => write!(f, "cached fallback"),
    }
  }
}
