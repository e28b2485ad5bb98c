use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::types::{AssetRequest, AssetResponse};

/// Where the asset cache goes on a miss.
#[async_trait]
pub trait Network: Send + Sync {
  /// Perform the request. Err means no response arrived at all;
  /// HTTP error statuses come back as responses.
  async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse>;
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
  async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
    (**self).fetch(request).await
  }
}

/// Network backed by a real HTTP client.
#[derive(Clone)]
pub struct HttpNetwork {
  client: Client,
}

impl HttpNetwork {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .user_agent(concat!("galaxy-cache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
    let response = self
      .client
      .get(request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read {}: {}", request.url, e))?;

    Ok(AssetResponse {
      status,
      content_type,
      body: body.to_vec(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[tokio::test]
  async fn test_fetch_keeps_status_and_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/fish-icon.svg"))
      .respond_with(
        ResponseTemplate::new(200)
          .insert_header("content-type", "image/svg+xml")
          .set_body_string("<svg/>"),
      )
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/missing.png"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let network = HttpNetwork::new(Duration::from_secs(1)).unwrap();
    let base = Url::parse(&server.uri()).unwrap();

    let icon = network
      .fetch(&AssetRequest::new(
        base.join("/fish-icon.svg").unwrap(),
        crate::assets::types::RequestMode::NoCors,
      ))
      .await
      .unwrap();
    assert_eq!(icon.status, 200);
    assert_eq!(icon.content_type.as_deref(), Some("image/svg+xml"));
    assert_eq!(icon.body, b"<svg/>");

    let missing = network
      .fetch(&AssetRequest::new(
        base.join("/missing.png").unwrap(),
        crate::assets::types::RequestMode::NoCors,
      ))
      .await
      .unwrap();
    assert_eq!(missing.status, 404);
  }

  #[tokio::test]
  async fn test_unreachable_host_is_error() {
    let network = HttpNetwork::new(Duration::from_millis(200)).unwrap();
    let request = AssetRequest::navigate(Url::parse("http://127.0.0.1:9/").unwrap());

    assert!(network.fetch(&request).await.is_err());
  }
}
