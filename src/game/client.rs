use crate::config::{ApiConfig, MAX_RETRY};
use color_eyre::{eyre::eyre, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Statuses worth a second attempt; anything else non-2xx fails at once.
const RETRYABLE_STATUSES: &[StatusCode] = &[
  StatusCode::REQUEST_TIMEOUT,
  StatusCode::PAYLOAD_TOO_LARGE,
  StatusCode::TOO_MANY_REQUESTS,
  StatusCode::INTERNAL_SERVER_ERROR,
  StatusCode::BAD_GATEWAY,
  StatusCode::SERVICE_UNAVAILABLE,
  StatusCode::GATEWAY_TIMEOUT,
];

/// Reachability probes use a shorter timeout than data requests.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Game API client wrapper
#[derive(Clone)]
pub struct GameApiClient {
  client: Client,
  base_url: String,
  timeout: Duration,
  retry: u32,
}

/// Outcome of one attempt, used to decide whether to try again.
enum Attempt<T> {
  Done(T),
  Retryable(color_eyre::Report),
}

impl GameApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .user_agent(concat!("galaxy-cache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_string(),
      timeout: config.timeout(),
      retry: config.retry.min(MAX_RETRY),
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  /// GET a JSON document, retrying immediately on transient failures.
  pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let url = self.url(path);
    let attempts = self.retry.saturating_add(1);

    let mut last_error = None;
    for attempt in 1..=attempts {
      match self.try_get(&url).await? {
        Attempt::Done(body) => return Ok(body),
        Attempt::Retryable(e) => {
          debug!(%url, attempt, error = %e, "request failed");
          last_error = Some(e);
        }
      }
    }

    Err(last_error.unwrap_or_else(|| eyre!("No attempts made for {}", url)))
  }

  /// Single attempt. Hard failures return Err, transient ones return `Attempt::Retryable`.
  async fn try_get<T: DeserializeOwned>(&self, url: &str) -> Result<Attempt<T>> {
    let response = match self.client.get(url).timeout(self.timeout).send().await {
      Ok(response) => response,
      Err(e) if e.is_timeout() => {
        return Ok(Attempt::Retryable(eyre!(
          "Request to {} timed out after {:?}",
          url,
          self.timeout
        )))
      }
      Err(e) => return Ok(Attempt::Retryable(eyre!("Request to {} failed: {}", url, e))),
    };

    let status = response.status();
    if !status.is_success() {
      let err = eyre!("Request to {} returned {}", url, status);
      if RETRYABLE_STATUSES.contains(&status) {
        return Ok(Attempt::Retryable(err));
      }
      return Err(err);
    }

    let bytes = match response.bytes().await {
      Ok(bytes) => bytes,
      Err(e) if e.is_timeout() => {
        return Ok(Attempt::Retryable(eyre!(
          "Reading response from {} timed out",
          url
        )))
      }
      Err(e) => return Err(eyre!("Failed to read response from {}: {}", url, e)),
    };

    let body =
      serde_json::from_slice(&bytes).map_err(|e| eyre!("Failed to parse {}: {}", url, e))?;
    Ok(Attempt::Done(body))
  }

  /// Whether the API host answers at all. Any HTTP status counts as reachable.
  pub async fn probe(&self) -> bool {
    self
      .client
      .head(&self.base_url)
      .timeout(PROBE_TIMEOUT)
      .send()
      .await
      .is_ok()
  }
}
