//! Routing rules: which requests get the shell, which responses get stored.

use url::Url;

use super::types::AssetRequest;

const ASSET_EXTENSIONS: &[&str] = &["js", "css", "svg", "png", "jpg", "jpeg", "gif", "ico"];

/// URL rules for one application origin.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
  origin: Url,
  spa_routes: Vec<String>,
  precache: Vec<String>,
}

impl RoutePolicy {
  pub fn new(origin: Url, spa_routes: Vec<String>, precache: Vec<String>) -> Self {
    Self {
      origin,
      spa_routes,
      precache,
    }
  }

  /// Resolve a manifest path against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
    self.origin.join(path)
  }

  /// Same-origin navigation to a route the client-side router owns.
  pub fn is_spa_route(&self, request: &AssetRequest) -> bool {
    request.is_navigation()
      && request.url.origin() == self.origin.origin()
      && self.spa_routes.iter().any(|route| route == request.url.path())
  }

  /// Whether a successful response for `url` should be stored.
  pub fn should_cache(&self, url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
      return false;
    }

    let path = url.path();
    path.contains("/assets/")
      || has_asset_extension(path)
      || self.precache.iter().any(|p| p == path)
  }
}

fn has_asset_extension(path: &str) -> bool {
  path
    .rsplit_once('.')
    .map(|(_, ext)| ASSET_EXTENSIONS.contains(&ext))
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assets::types::RequestMode;

  fn policy() -> RoutePolicy {
    RoutePolicy::new(
      Url::parse("https://fish.example").unwrap(),
      vec!["/".into(), "/leaderboard".into(), "/market".into()],
      vec!["/".into(), "/index.html".into(), "/market".into()],
    )
  }

  fn request(url: &str, mode: RequestMode) -> AssetRequest {
    AssetRequest::new(Url::parse(url).unwrap(), mode)
  }

  #[test]
  fn test_spa_route_requires_navigation() {
    let policy = policy();
    assert!(policy.is_spa_route(&request(
      "https://fish.example/leaderboard",
      RequestMode::Navigate
    )));
    assert!(!policy.is_spa_route(&request(
      "https://fish.example/leaderboard",
      RequestMode::Cors
    )));
  }

  #[test]
  fn test_spa_route_ignores_query_string() {
    assert!(policy().is_spa_route(&request(
      "https://fish.example/market?tab=rods",
      RequestMode::Navigate
    )));
  }

  #[test]
  fn test_spa_route_requires_same_origin_and_known_path() {
    let policy = policy();
    assert!(!policy.is_spa_route(&request(
      "https://other.example/market",
      RequestMode::Navigate
    )));
    assert!(!policy.is_spa_route(&request(
      "https://fish.example/settings",
      RequestMode::Navigate
    )));
  }

  #[test]
  fn test_should_cache_assets() {
    let policy = policy();
    let cached = [
      "https://fish.example/assets/index-4f2a.js",
      "https://fish.example/fish-icon.svg",
      "https://cdn.example/font.css",
      "https://fish.example/img/boat.JPEG.png",
      "https://fish.example/assets/data",
      "https://fish.example/market",
    ];
    for url in cached {
      assert!(policy.should_cache(&Url::parse(url).unwrap()), "{}", url);
    }
  }

  #[test]
  fn test_should_not_cache_other_requests() {
    let policy = policy();
    let uncached = [
      "https://fish.example/api/leaderboard",
      "https://fish.example/manifest.json",
      "https://fish.example/leaderboard",
      "ftp://fish.example/app.js",
    ];
    for url in uncached {
      assert!(!policy.should_cache(&Url::parse(url).unwrap()), "{}", url);
    }
  }
}
