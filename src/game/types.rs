use serde::{Deserialize, Serialize};

/// One row of the leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
  pub rank: i64,
  pub username: String,
  pub level: i64,
  pub xp: i64,
  pub gold: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fish_emojis: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_infected: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub original_rank: Option<i64>,
}

/// Item offered in the market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketItem {
  pub id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub item_type: String,
  pub description: String,
  pub cost: i64,
}
