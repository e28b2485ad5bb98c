//! Connectivity signal consulted before any network read.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::game::client::GameApiClient;

/// Point-in-time view of connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
  pub is_online: bool,
  /// Set on an offline to online transition, cleared after a short delay
  pub was_offline: bool,
  pub last_online_time: Option<DateTime<Utc>>,
}

impl ConnectionState {
  fn initial(is_online: bool) -> Self {
    Self {
      is_online,
      was_offline: false,
      last_online_time: is_online.then(Utc::now),
    }
  }
}

/// Shared online/offline state.
///
/// Cloning is cheap; all clones observe and update the same state.
#[derive(Clone)]
pub struct ConnectivitySignal {
  tx: Arc<watch::Sender<ConnectionState>>,
  /// Bumped on every reconnect so a stale reset timer leaves a newer flag alone
  generation: Arc<AtomicU64>,
  reconnect_flag: Duration,
}

impl ConnectivitySignal {
  pub fn new(is_online: bool, reconnect_flag: Duration) -> Self {
    let (tx, _rx) = watch::channel(ConnectionState::initial(is_online));
    Self {
      tx: Arc::new(tx),
      generation: Arc::new(AtomicU64::new(0)),
      reconnect_flag,
    }
  }

  /// Current state.
  pub fn snapshot(&self) -> ConnectionState {
    *self.tx.borrow()
  }

  /// Receiver that is notified on every state change.
  pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
    self.tx.subscribe()
  }

  /// Record the latest connectivity reading.
  pub fn update(&self, online: bool) {
    let previous = self.snapshot();

    if online && !previous.is_online {
      let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
      info!("connection restored");
      self.tx.send_modify(|state| {
        state.is_online = true;
        state.was_offline = true;
        state.last_online_time = Some(Utc::now());
      });
      self.schedule_reset(generation);
    } else if !online && previous.is_online {
      info!("connection lost");
      self.tx.send_modify(|state| {
        state.is_online = false;
        state.last_online_time = None;
      });
    }
  }

  fn schedule_reset(&self, generation: u64) {
    let tx = Arc::downgrade(&self.tx);
    let current = Arc::clone(&self.generation);
    let delay = self.reconnect_flag;

    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      if current.load(Ordering::SeqCst) != generation {
        return;
      }
      if let Some(tx) = tx.upgrade() {
        tx.send_modify(|state| state.was_offline = false);
      }
    });
  }
}

/// Background task that feeds the signal from periodic reachability probes.
pub struct ConnectivityMonitor {
  handle: JoinHandle<()>,
}

impl ConnectivityMonitor {
  /// Start probing `client` every `interval`.
  pub fn spawn(client: GameApiClient, signal: ConnectivitySignal, interval: Duration) -> Self {
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

      loop {
        ticker.tick().await;
        let online = client.probe().await;
        debug!(online, "connectivity probe");
        signal.update(online);
      }
    });

    Self { handle }
  }

  pub fn stop(self) {
    self.handle.abort();
  }
}

impl Drop for ConnectivityMonitor {
  fn drop(&mut self) {
    self.handle.abort();
  }
}
