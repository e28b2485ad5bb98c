//! Offline asset cache for the game's web front-end.
//!
//! Stores a versioned set of responses and answers requests cache-first:
//! - Precaches a fixed manifest on install, all or nothing
//! - Drops every cache of an older version on activate
//! - Serves the application shell for client-side routes
//! - Degrades to the shell or a synthetic 408 when the network fails

mod network;
mod policy;
mod store;
mod types;
mod worker;

pub use network::HttpNetwork;
pub use policy::RoutePolicy;
pub use store::AssetStore;
pub use types::{AssetRequest, ControlMessage, RequestMode};
pub use worker::{AssetCache, AssetCacheOptions};
