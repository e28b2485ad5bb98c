//! Snapshot cache wiring for the game types.

use crate::cache::Resource;

use super::api_types::{ApiLeaderboardResponse, ApiMarketResponse};
use super::types::{LeaderboardEntry, MarketItem};

impl Resource for LeaderboardEntry {
  type Envelope = ApiLeaderboardResponse;

  fn store_name() -> &'static str {
    "leaderboard"
  }

  fn endpoint() -> &'static str {
    "leaderboard"
  }

  fn from_envelope(envelope: Self::Envelope) -> Vec<Self> {
    envelope.players
  }

  fn entry_key(&self) -> Option<String> {
    // Ranks may repeat; rows are keyed by position
    None
  }

  fn sort_entries(entries: &mut [Self]) {
    entries.sort_by_key(|entry| entry.rank);
  }
}

impl Resource for MarketItem {
  type Envelope = ApiMarketResponse;

  fn store_name() -> &'static str {
    "market"
  }

  fn endpoint() -> &'static str {
    "market"
  }

  fn from_envelope(envelope: Self::Envelope) -> Vec<Self> {
    envelope.items
  }

  fn entry_key(&self) -> Option<String> {
    Some(self.id.clone())
  }
}
