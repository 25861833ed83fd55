//! The offline worker: cache lifecycle, request interception, notifications
//! and transaction sync, driven one event at a time by the runner.

pub mod dispatch;
mod fetch;
mod lifecycle;
pub mod notify;
pub mod sync;

use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use url::Url;

use crate::cache::{CacheLayer, CacheStorage};
use crate::config::Config;
use crate::net::Network;

pub use dispatch::Dispatcher;
pub use lifecycle::{ActivateReport, InstallReport};
pub use notify::{Clients, NotificationOptions, Notifier};
pub use sync::{PendingQueue, QueueStore, SyncReport};

/// Lifecycle states a worker moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install failed; this version will never activate
  Redundant,
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WorkerState::Parsed => write!(f, "parsed"),
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Activated => write!(f, "activated"),
      WorkerState::Redundant => write!(f, "redundant"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
  pub state: WorkerState,
  /// Activate as soon as installed instead of waiting for old clients to close
  pub skip_waiting: bool,
  pub clients_claimed: bool,
}

impl Default for Lifecycle {
  fn default() -> Self {
    Self {
      state: WorkerState::Parsed,
      skip_waiting: false,
      clients_claimed: false,
    }
  }
}

/// Runtime-provided surfaces the worker talks to.
#[derive(Clone)]
pub struct Host {
  pub network: Arc<dyn Network>,
  pub notifier: Arc<dyn Notifier>,
  pub clients: Arc<dyn Clients>,
}

pub struct Worker<S: CacheStorage> {
  config: Config,
  origin: Url,
  cache: CacheLayer<S>,
  queue: Arc<dyn QueueStore>,
  host: Host,
  lifecycle: Mutex<Lifecycle>,
}

impl<S: CacheStorage> Worker<S> {
  pub fn new(config: Config, storage: Arc<S>, queue: Arc<dyn QueueStore>, host: Host) -> Result<Self> {
    let origin = config.origin_url()?;
    let cache = CacheLayer::new(storage, config.cache.version.clone());

    Ok(Self {
      config,
      origin,
      cache,
      queue,
      host,
      lifecycle: Mutex::new(Lifecycle::default()),
    })
  }

  pub fn lifecycle(&self) -> Result<Lifecycle> {
    self
      .lifecycle
      .lock()
      .map(|l| *l)
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn update_lifecycle(&self, f: impl FnOnce(&mut Lifecycle)) -> Result<()> {
    let mut lifecycle = self
      .lifecycle
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    f(&mut lifecycle);
    Ok(())
  }

  /// Resolve a path (or absolute URL) against the app origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid URL '{}': {}", path, e))
  }
}
