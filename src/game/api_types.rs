//! Serde-deserializable types matching the game API responses.
//!
//! The endpoints wrap each collection in an object; a missing array field
//! is treated as an empty collection.

use serde::Deserialize;

use super::types::{LeaderboardEntry, MarketItem};

#[derive(Debug, Default, Deserialize)]
pub struct ApiLeaderboardResponse {
  #[serde(default)]
  pub players: Vec<LeaderboardEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiMarketResponse {
  #[serde(default)]
  pub items: Vec<MarketItem>,
}
