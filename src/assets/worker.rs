//! Asset cache lifecycle and fetch handling.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

use super::network::Network;
use super::policy::RoutePolicy;
use super::store::AssetStore;
use super::types::{AssetRequest, AssetResponse, ControlMessage, RequestMode, WorkerState};

/// Settings for one asset cache version.
#[derive(Debug, Clone)]
pub struct AssetCacheOptions {
  /// Cache name; bumping it discards every other cache on activate
  pub version: String,
  pub policy: RoutePolicy,
  /// Paths fetched on install, relative to the policy origin
  pub precache: Vec<String>,
  /// Application shell path
  pub shell: String,
  /// Activate right after install instead of waiting for a SKIP_WAITING message
  pub skip_waiting: bool,
}

/// Offline cache in front of the network for one application origin.
pub struct AssetCache<N: Network> {
  store: Arc<AssetStore>,
  network: N,
  options: AssetCacheOptions,
  precache: Vec<Url>,
  shell: Url,
  state: Mutex<WorkerState>,
  skip_waiting: AtomicBool,
  clients_claimed: AtomicBool,
}

impl<N: Network> AssetCache<N> {
  /// Create the cache, picking up the lifecycle state left by an earlier run.
  pub fn new(store: Arc<AssetStore>, network: N, options: AssetCacheOptions) -> Result<Self> {
    let precache = options
      .precache
      .iter()
      .map(|path| {
        options
          .policy
          .resolve(path)
          .map_err(|e| eyre!("Invalid precache path {}: {}", path, e))
      })
      .collect::<Result<Vec<_>>>()?;
    let shell = options
      .policy
      .resolve(&options.shell)
      .map_err(|e| eyre!("Invalid shell path {}: {}", options.shell, e))?;

    let keys = store.keys()?;
    let state = if !is_installed(&store, &options.version, &precache)? {
      WorkerState::Parsed
    } else if keys.len() == 1 {
      WorkerState::Activated
    } else {
      WorkerState::Installed
    };
    let claimed = state == WorkerState::Activated;

    Ok(Self {
      store,
      network,
      skip_waiting: AtomicBool::new(options.skip_waiting),
      options,
      precache,
      shell,
      state: Mutex::new(state),
      clients_claimed: AtomicBool::new(claimed),
    })
  }

  pub fn version(&self) -> &str {
    &self.options.version
  }

  pub fn state(&self) -> WorkerState {
    self.state.lock().map(|s| *s).unwrap_or(WorkerState::Redundant)
  }

  fn set_state(&self, state: WorkerState) {
    if let Ok(mut current) = self.state.lock() {
      let from = *current;
      debug!(%from, to = %state, "worker state");
      *current = state;
    }
  }

  pub fn clients_claimed(&self) -> bool {
    self.clients_claimed.load(Ordering::SeqCst)
  }

  /// Fetch and store every precache URL not already in the current cache.
  ///
  /// All or nothing: a single failed or non-200 fetch stores nothing.
  /// Returns how many URLs were fetched.
  pub async fn install(&self) -> Result<usize> {
    info!(version = %self.options.version, "installing");
    self.set_state(WorkerState::Installing);

    match self.precache_missing().await {
      Ok(fetched) => {
        self.set_state(WorkerState::Installed);
        info!(fetched, "install complete");

        if self.skip_waiting.load(Ordering::SeqCst) {
          self.activate()?;
        }
        Ok(fetched)
      }
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        Err(e)
      }
    }
  }

  async fn precache_missing(&self) -> Result<usize> {
    let version = &self.options.version;

    let mut missing = Vec::new();
    for url in &self.precache {
      let key = cache_key(url);
      if !self.store.contains(version, &key)? && !missing.contains(&key) {
        missing.push(key);
      }
    }

    let entries = try_join_all(missing.iter().map(|key| async move {
      let url = Url::parse(key).map_err(|e| eyre!("Invalid URL {}: {}", key, e))?;
      let response = self
        .network
        .fetch(&AssetRequest::new(url, RequestMode::SameOrigin))
        .await?;
      if !response.is_ok() {
        return Err(eyre!(
          "Precache of {} failed with status {}",
          key,
          response.status
        ));
      }
      Ok::<_, color_eyre::Report>((key.clone(), response))
    }))
    .await?;

    // Also creates the cache row; a failed install leaves none behind
    self.store.put_all(version, &entries)?;
    Ok(entries.len())
  }

  /// Delete every cache except the current version and take control of clients.
  /// Returns the names of the deleted caches.
  pub fn activate(&self) -> Result<Vec<String>> {
    match self.state() {
      WorkerState::Installed | WorkerState::Activated => {}
      state => return Err(eyre!("Cannot activate a worker in state {}", state)),
    }
    info!(version = %self.options.version, "activating");
    self.set_state(WorkerState::Activating);

    let mut deleted = Vec::new();
    for name in self.store.keys()? {
      if name != self.options.version {
        info!(cache = %name, "clearing old cache");
        self.store.delete(&name)?;
        deleted.push(name);
      }
    }

    self.clients_claimed.store(true, Ordering::SeqCst);
    self.set_state(WorkerState::Activated);
    Ok(deleted)
  }

  /// Handle a control message posted by a page.
  pub fn handle_message(&self, message: ControlMessage) -> Result<()> {
    match message {
      ControlMessage::SkipWaiting => {
        self.skip_waiting.store(true, Ordering::SeqCst);
        if self.state() == WorkerState::Installed {
          self.activate()?;
        }
      }
      ControlMessage::Unknown => debug!("ignoring unknown control message"),
    }
    Ok(())
  }

  /// Answer a request. Never fails; the worst case is a synthetic error response.
  pub async fn handle_fetch(&self, request: &AssetRequest) -> AssetResponse {
    if !request.is_http() {
      return self
        .network
        .fetch(request)
        .await
        .unwrap_or_else(|e| {
          warn!(url = %request.url, error = %e, "fetch failed");
          AssetResponse::network_error()
        });
    }

    if self.options.policy.is_spa_route(request) {
      return self.serve_shell(request).await;
    }

    if let Some(cached) = self.lookup(&request.url) {
      debug!(url = %request.url, "serving from cache");
      return cached;
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() && self.options.policy.should_cache(&request.url) {
          debug!(url = %request.url, "caching asset");
          if let Err(e) = self
            .store
            .put(&self.options.version, &cache_key(&request.url), &response)
          {
            error!(url = %request.url, error = %e, "cache put failed");
          }
        }
        response
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "fetch failed");
        if request.is_navigation() {
          self
            .lookup(&self.shell)
            .unwrap_or_else(AssetResponse::network_error)
        } else {
          AssetResponse::network_error()
        }
      }
    }
  }

  /// Shell first, then network, then the shell once more.
  async fn serve_shell(&self, request: &AssetRequest) -> AssetResponse {
    if let Some(shell) = self.lookup(&self.shell) {
      return shell;
    }

    match self.network.fetch(request).await {
      Ok(response) => response,
      Err(e) => {
        warn!(url = %request.url, error = %e, "navigation fetch failed");
        self
          .lookup(&self.shell)
          .unwrap_or_else(AssetResponse::network_error)
      }
    }
  }

  fn lookup(&self, url: &Url) -> Option<AssetResponse> {
    self
      .store
      .match_url(&cache_key(url))
      .unwrap_or_else(|e| {
        error!(%url, error = %e, "cache lookup failed");
        None
      })
  }
}

/// A version counts as installed only when its cache holds every precache URL.
fn is_installed(store: &AssetStore, version: &str, precache: &[Url]) -> Result<bool> {
  if !store.keys()?.iter().any(|name| name == version) {
    return Ok(false);
  }
  for url in precache {
    if !store.contains(version, &cache_key(url))? {
      return Ok(false);
    }
  }
  Ok(true)
}

/// Cache entries ignore URL fragments.
fn cache_key(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::collections::HashMap;

  const ORIGIN: &str = "https://fish.example";

  /// Network that answers from a fixed table and records every call.
  #[derive(Default)]
  struct ScriptedNetwork {
    responses: Mutex<HashMap<String, AssetResponse>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
  }

  impl ScriptedNetwork {
    fn serve(&self, path: &str, response: AssetResponse) {
      self
        .responses
        .lock()
        .unwrap()
        .insert(format!("{}{}", ORIGIN, path), response);
    }

    fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    fn calls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
      let url = request.url.to_string();
      self.calls.lock().unwrap().push(url.clone());
      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("network unreachable"));
      }
      Ok(
        self
          .responses
          .lock()
          .unwrap()
          .get(&url)
          .cloned()
          .unwrap_or(AssetResponse {
            status: 404,
            content_type: None,
            body: Vec::new(),
          }),
      )
    }
  }

  fn options(version: &str) -> AssetCacheOptions {
    AssetCacheOptions {
      version: version.to_string(),
      policy: RoutePolicy::new(
        Url::parse(ORIGIN).unwrap(),
        vec!["/".into(), "/leaderboard".into(), "/market".into()],
        vec!["/".into(), "/index.html".into(), "/fish-icon.svg".into()],
      ),
      precache: vec!["/".into(), "/index.html".into(), "/fish-icon.svg".into()],
      shell: "/index.html".to_string(),
      skip_waiting: true,
    }
  }

  fn network() -> Arc<ScriptedNetwork> {
    let network = Arc::new(ScriptedNetwork::default());
    network.serve("/", AssetResponse::ok(Some("text/html"), "<div id=app>"));
    network.serve(
      "/index.html",
      AssetResponse::ok(Some("text/html"), "<div id=app>"),
    );
    network.serve(
      "/fish-icon.svg",
      AssetResponse::ok(Some("image/svg+xml"), "<svg/>"),
    );
    network
  }

  fn cache(
    store: &Arc<AssetStore>,
    network: &Arc<ScriptedNetwork>,
    version: &str,
  ) -> AssetCache<Arc<ScriptedNetwork>> {
    AssetCache::new(Arc::clone(store), Arc::clone(network), options(version)).unwrap()
  }

  fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
  }

  #[tokio::test]
  async fn test_install_precaches_and_activates() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    let cache = cache(&store, &network, "v1");
    assert_eq!(cache.state(), WorkerState::Parsed);

    assert_eq!(cache.install().await.unwrap(), 3);

    assert_eq!(cache.state(), WorkerState::Activated);
    assert!(cache.clients_claimed());
    assert_eq!(store.entries("v1").unwrap().len(), 3);
  }

  #[tokio::test]
  async fn test_reinstall_is_idempotent() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    let cache = cache(&store, &network, "v1");

    cache.install().await.unwrap();
    let calls_after_first = network.calls().len();

    assert_eq!(cache.install().await.unwrap(), 0);
    assert_eq!(network.calls().len(), calls_after_first);
    assert_eq!(store.entries("v1").unwrap().len(), 3);
    assert_eq!(store.keys().unwrap(), vec!["v1"]);
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    network.serve(
      "/fish-icon.svg",
      AssetResponse {
        status: 500,
        content_type: None,
        body: Vec::new(),
      },
    );
    let cache = cache(&store, &network, "v1");

    assert!(cache.install().await.is_err());
    assert_eq!(cache.state(), WorkerState::Redundant);
    assert!(store.entries("v1").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_activate_after_version_bump_leaves_only_current_cache() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();

    cache(&store, &network, "v1").install().await.unwrap();
    store
      .put("unrelated", url("/x.js").as_str(), &AssetResponse::ok(None, "x"))
      .unwrap();

    let next = cache(&store, &network, "v2");
    assert_eq!(next.state(), WorkerState::Parsed);
    next.install().await.unwrap();

    assert_eq!(store.keys().unwrap(), vec!["v2"]);
    assert_eq!(store.entries("v2").unwrap().len(), 3);
  }

  #[tokio::test]
  async fn test_waits_for_skip_waiting_message() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    cache(&store, &network, "v1").install().await.unwrap();

    let mut opts = options("v2");
    opts.skip_waiting = false;
    let next = AssetCache::new(Arc::clone(&store), Arc::clone(&network), opts).unwrap();
    next.install().await.unwrap();

    assert_eq!(next.state(), WorkerState::Installed);
    assert!(!next.clients_claimed());
    assert_eq!(store.keys().unwrap(), vec!["v1", "v2"]);

    next
      .handle_message(ControlMessage::parse(r#"{"type":"SKIP_WAITING"}"#))
      .unwrap();

    assert_eq!(next.state(), WorkerState::Activated);
    assert_eq!(store.keys().unwrap(), vec!["v2"]);
  }

  #[tokio::test]
  async fn test_state_restored_from_store() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    cache(&store, &network, "v1").install().await.unwrap();

    let again = cache(&store, &network, "v1");
    assert_eq!(again.state(), WorkerState::Activated);
    assert!(again.clients_claimed());
  }

  #[tokio::test]
  async fn test_failed_install_does_not_survive_restart() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    cache(&store, &network, "v1").install().await.unwrap();

    network.set_offline(true);
    let failed = cache(&store, &network, "v2");
    assert!(failed.install().await.is_err());
    assert_eq!(failed.state(), WorkerState::Redundant);
    assert_eq!(store.keys().unwrap(), vec!["v1"]);

    let restarted = cache(&store, &network, "v2");
    assert_eq!(restarted.state(), WorkerState::Parsed);
    assert!(restarted.activate().is_err());
    assert_eq!(store.keys().unwrap(), vec!["v1"]);
    assert_eq!(store.entries("v1").unwrap().len(), 3);

    let page = restarted
      .handle_fetch(&AssetRequest::navigate(url("/market")))
      .await;
    assert_eq!(page.status, 200);
    assert_eq!(page.body, b"<div id=app>");
  }

  #[tokio::test]
  async fn test_partial_cache_is_not_installed() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    cache(&store, &network, "v1").install().await.unwrap();

    // Runtime caching can create the next version's cache before install
    store
      .put("v2", url("/assets/app.js").as_str(), &AssetResponse::ok(None, "js"))
      .unwrap();

    let next = cache(&store, &network, "v2");
    assert_eq!(next.state(), WorkerState::Parsed);
    assert!(next.activate().is_err());
    assert_eq!(store.entries("v1").unwrap().len(), 3);
  }

  #[tokio::test]
  async fn test_activate_requires_install() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let cache = cache(&store, &network(), "v1");

    assert!(cache.activate().is_err());
  }

  #[tokio::test]
  async fn test_spa_route_served_from_shell_offline() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    let cache = cache(&store, &network, "v1");
    cache.install().await.unwrap();
    network.set_offline(true);

    // /market was never cached on its own
    assert!(!store.contains("v1", url("/market").as_str()).unwrap());

    let response = cache
      .handle_fetch(&AssetRequest::navigate(url("/market?tab=bait")))
      .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"<div id=app>");
  }

  #[tokio::test]
  async fn test_spa_route_without_shell_uses_network() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    network.serve("/leaderboard", AssetResponse::ok(Some("text/html"), "server"));
    let cache = cache(&store, &network, "v1");

    let response = cache
      .handle_fetch(&AssetRequest::navigate(url("/leaderboard")))
      .await;
    assert_eq!(response.body, b"server");

    network.set_offline(true);
    let response = cache
      .handle_fetch(&AssetRequest::navigate(url("/leaderboard")))
      .await;
    assert_eq!(response, AssetResponse::network_error());
  }

  #[tokio::test]
  async fn test_cache_first_then_network_and_store() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    network.serve(
      "/assets/index-9c1.js",
      AssetResponse::ok(Some("text/javascript"), "console.log(1)"),
    );
    let cache = cache(&store, &network, "v1");
    cache.install().await.unwrap();

    let request = AssetRequest::new(url("/assets/index-9c1.js"), RequestMode::NoCors);
    let first = cache.handle_fetch(&request).await;
    assert_eq!(first.body, b"console.log(1)");
    assert!(store
      .contains("v1", url("/assets/index-9c1.js").as_str())
      .unwrap());

    network.set_offline(true);
    let calls = network.calls().len();
    let second = cache.handle_fetch(&request).await;
    assert_eq!(second, first);
    assert_eq!(network.calls().len(), calls);
  }

  #[tokio::test]
  async fn test_non_asset_and_error_responses_not_stored() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    network.serve("/api/status", AssetResponse::ok(Some("application/json"), "{}"));
    let cache = cache(&store, &network, "v1");

    let api = cache
      .handle_fetch(&AssetRequest::new(url("/api/status"), RequestMode::Cors))
      .await;
    assert_eq!(api.status, 200);

    let missing = cache
      .handle_fetch(&AssetRequest::new(url("/gone.png"), RequestMode::NoCors))
      .await;
    assert_eq!(missing.status, 404);

    assert!(store.entries("v1").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_network_failure_fallbacks() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    let cache = cache(&store, &network, "v1");
    cache.install().await.unwrap();
    network.set_offline(true);

    let image = cache
      .handle_fetch(&AssetRequest::new(url("/boat.png"), RequestMode::NoCors))
      .await;
    assert_eq!(image, AssetResponse::network_error());

    // Navigation outside the router still degrades to the shell
    let page = cache
      .handle_fetch(&AssetRequest::navigate(url("/settings")))
      .await;
    assert_eq!(page.body, b"<div id=app>");
  }

  #[tokio::test]
  async fn test_fragment_ignored_for_lookup() {
    let store = Arc::new(AssetStore::open_in_memory().unwrap());
    let network = network();
    let cache = cache(&store, &network, "v1");
    cache.install().await.unwrap();
    network.set_offline(true);

    let response = cache
      .handle_fetch(&AssetRequest::new(
        url("/fish-icon.svg#fin"),
        RequestMode::NoCors,
      ))
      .await;
    assert_eq!(response.body, b"<svg/>");
  }
}
