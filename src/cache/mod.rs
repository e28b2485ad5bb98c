//! Local snapshot cache for the game resources.
//!
//! This module provides the read-through mechanism shared by every resource:
//! - Mirrors each successful fetch into a local SQLite store (full replacement)
//! - Serves the last saved snapshot when offline or when the network fails
//! - Never surfaces an error to the caller

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{SnapshotStore, SqliteStorage};
pub use traits::{CacheSource, Resource, Snapshot};
