use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheResult, CacheStorage};
use crate::net::Response;
use crate::worker::notify::PRIMARY_KEY;
use crate::worker::{
  ActivateReport, Dispatcher, InstallReport, NotificationOptions, SyncReport, Worker,
};

/// Events the runtime delivers to the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
  Install,
  Activate,
  /// A page request to intercept
  Fetch {
    url: String,
    #[serde(default = "default_method")]
    method: String,
  },
  /// Push message with an optional text payload
  Push {
    #[serde(default)]
    data: Option<String>,
  },
  NotificationClick {
    #[serde(default)]
    action: Option<String>,
    #[serde(default = "default_primary_key")]
    primary_key: u64,
  },
  /// Background sync trigger
  Sync { tag: String },
}

fn default_method() -> String {
  "GET".to_string()
}

fn default_primary_key() -> u64 {
  PRIMARY_KEY
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  Install,
  Activate,
  Fetch,
  Push,
  NotificationClick,
  Sync,
}

impl EventKind {
  pub const ALL: [EventKind; 6] = [
    EventKind::Install,
    EventKind::Activate,
    EventKind::Fetch,
    EventKind::Push,
    EventKind::NotificationClick,
    EventKind::Sync,
  ];
}

impl std::fmt::Display for EventKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      EventKind::Install => write!(f, "install"),
      EventKind::Activate => write!(f, "activate"),
      EventKind::Fetch => write!(f, "fetch"),
      EventKind::Push => write!(f, "push"),
      EventKind::NotificationClick => write!(f, "notification_click"),
      EventKind::Sync => write!(f, "sync"),
    }
  }
}

impl Event {
  pub fn kind(&self) -> EventKind {
    match self {
      Event::Install => EventKind::Install,
      Event::Activate => EventKind::Activate,
      Event::Fetch { .. } => EventKind::Fetch,
      Event::Push { .. } => EventKind::Push,
      Event::NotificationClick { .. } => EventKind::NotificationClick,
      Event::Sync { .. } => EventKind::Sync,
    }
  }
}

/// What handling an event produced
#[derive(Debug)]
pub enum Outcome {
  Installed(InstallReport),
  Activated(ActivateReport),
  Responded(CacheResult<Response>),
  Notified(NotificationOptions),
  Clicked { opened: Option<Url> },
  /// `None` when the sync tag was not ours
  Synced(Option<SyncReport>),
}

struct Envelope {
  event: Event,
  reply: oneshot::Sender<Result<Outcome>>,
}

/// Handle for delivering events to a running [`Runner`]
#[derive(Clone)]
pub struct EventSender {
  tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSender {
  /// Deliver an event and wait until the worker has resolved it
  pub async fn dispatch(&self, event: Event) -> Result<Outcome> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(Envelope { event, reply })
      .map_err(|_| eyre!("Worker runner has stopped"))?;

    rx.await
      .map_err(|_| eyre!("Worker runner dropped the event"))?
  }
}

/// Processes events one at a time, in the order they were sent.
///
/// Each event's handler future is awaited to completion before the event
/// is resolved and the next one is taken.
pub struct Runner<S: CacheStorage> {
  rx: mpsc::UnboundedReceiver<Envelope>,
  worker: Arc<Worker<S>>,
  dispatcher: Dispatcher<S>,
}

impl<S: CacheStorage + 'static> Runner<S> {
  pub fn new(worker: Arc<Worker<S>>, dispatcher: Dispatcher<S>) -> (Self, EventSender) {
    let (tx, rx) = mpsc::unbounded_channel();
    let runner = Self {
      rx,
      worker,
      dispatcher,
    };
    (runner, EventSender { tx })
  }

  /// Run until every [`EventSender`] has been dropped
  pub async fn run(mut self) {
    while let Some(Envelope { event, reply }) = self.rx.recv().await {
      let kind = event.kind();
      debug!("Dispatching {} event", kind);

      let result = self.dispatcher.dispatch(&self.worker, event).await;
      if let Err(err) = &result {
        warn!("{} event failed: {}", kind, err);
      }

      if reply.send(result).is_err() {
        debug!("Sender of {} event went away before it resolved", kind);
      }
    }
  }
}
