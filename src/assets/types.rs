use serde::Deserialize;
use url::Url;

/// How the page issued a request; only navigations get shell routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  Navigate,
  SameOrigin,
  NoCors,
  Cors,
}

#[derive(Debug, Clone)]
pub struct AssetRequest {
  pub url: Url,
  pub mode: RequestMode,
}

impl AssetRequest {
  pub fn new(url: Url, mode: RequestMode) -> Self {
    Self { url, mode }
  }

  #[cfg(test)]
  pub fn navigate(url: Url) -> Self {
    Self::new(url, RequestMode::Navigate)
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  pub fn is_http(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl AssetResponse {
  #[cfg(test)]
  pub fn ok(content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status: 200,
      content_type: content_type.map(String::from),
      body: body.into(),
    }
  }

  /// Placeholder returned when the network fails and nothing is cached.
  pub fn network_error() -> Self {
    Self {
      status: 408,
      content_type: Some("text/plain".to_string()),
      body: b"Network error happened".to_vec(),
    }
  }

  pub fn is_ok(&self) -> bool {
    self.status == 200
  }
}

/// Control messages a page can post to the asset cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
  #[serde(other)]
  Unknown,
}

impl ControlMessage {
  /// Parse a posted message. Anything unrecognised maps to `Unknown`.
  pub fn parse(raw: &str) -> Self {
    serde_json::from_str(raw).unwrap_or(Self::Unknown)
  }
}

/// Lifecycle of the asset cache worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  /// Installed and waiting to activate
  Installed,
  Activating,
  Activated,
  /// Install failed
  Redundant,
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Self::Parsed => "parsed",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Activated => "activated",
      Self::Redundant => "redundant",
    };
    f.write_str(name)
  }
}
