//! Dispatch table mapping each event kind to its handler.

use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;

use super::Worker;
use crate::cache::CacheStorage;
use crate::event::{Event, EventKind, Outcome};

/// A handler takes the worker and its event and returns the work to await.
pub type Handler<S> = fn(Arc<Worker<S>>, Event) -> BoxFuture<'static, Result<Outcome>>;

pub struct Dispatcher<S: CacheStorage> {
  handlers: HashMap<EventKind, Handler<S>>,
}

impl<S: CacheStorage + 'static> Dispatcher<S> {
  /// A dispatcher with no handlers registered.
  pub fn empty() -> Self {
    Self {
      handlers: HashMap::new(),
    }
  }

  /// Register a handler, returning the one it replaced.
  pub fn register(&mut self, kind: EventKind, handler: Handler<S>) -> Option<Handler<S>> {
    self.handlers.insert(kind, handler)
  }

  pub fn handles(&self, kind: EventKind) -> bool {
    self.handlers.contains_key(&kind)
  }

  pub async fn dispatch(&self, worker: &Arc<Worker<S>>, event: Event) -> Result<Outcome> {
    let kind = event.kind();
    let handler = self
      .handlers
      .get(&kind)
      .ok_or_else(|| eyre!("No handler registered for {} events", kind))?;

    handler(Arc::clone(worker), event).await
  }
}

impl<S: CacheStorage + 'static> Default for Dispatcher<S> {
  fn default() -> Self {
    let mut dispatcher = Self::empty();
    dispatcher.register(EventKind::Install, on_install);
    dispatcher.register(EventKind::Activate, on_activate);
    dispatcher.register(EventKind::Fetch, on_fetch);
    dispatcher.register(EventKind::Push, on_push);
    dispatcher.register(EventKind::NotificationClick, on_notification_click);
    dispatcher.register(EventKind::Sync, on_sync);
    dispatcher
  }
}

fn mismatch(expected: EventKind, event: &Event) -> color_eyre::Report {
  eyre!("{} handler received a {} event", expected, event.kind())
}

fn on_install<S: CacheStorage + 'static>(
  worker: Arc<Worker<S>>,
  _event: Event,
) -> BoxFuture<'static, Result<Outcome>> {
  async move { worker.install().await.map(Outcome::Installed) }.boxed()
}

fn on_activate<S: CacheStorage + 'static>(
  worker: Arc<Worker<S>>,
  _event: Event,
) -> BoxFuture<'static, Result<Outcome>> {
  async move { worker.activate().await.map(Outcome::Activated) }.boxed()
}

fn on_fetch<S: CacheStorage + 'static>(
  worker: Arc<Worker<S>>,
  event: Event,
) -> BoxFuture<'static, Result<Outcome>> {
  async move {
    match event {
      Event::Fetch { url, method } => worker.fetch(&method, &url).await.map(Outcome::Responded),
      other => Err(mismatch(EventKind::Fetch, &other)),
    }
  }
  .boxed()
}

fn on_push<S: CacheStorage + 'static>(
  worker: Arc<Worker<S>>,
  event: Event,
) -> BoxFuture<'static, Result<Outcome>> {
  async move {
    match event {
      Event::Push { data } => worker.push(data.as_deref()).await.map(Outcome::Notified),
      other => Err(mismatch(EventKind::Push, &other)),
    }
  }
  .boxed()
}

fn on_notification_click<S: CacheStorage + 'static>(
  worker: Arc<Worker<S>>,
  event: Event,
) -> BoxFuture<'static, Result<Outcome>> {
  async move {
    match event {
      Event::NotificationClick {
        action,
        primary_key,
      } => worker
        .notification_click(action.as_deref(), primary_key)
        .await
        .map(|opened| Outcome::Clicked { opened }),
      other => Err(mismatch(EventKind::NotificationClick, &other)),
    }
  }
  .boxed()
}

fn on_sync<S: CacheStorage + 'static>(
  worker: Arc<Worker<S>>,
  event: Event,
) -> BoxFuture<'static, Result<Outcome>> {
  async move {
    match event {
      Event::Sync { tag } => worker.sync(&tag).await.map(Outcome::Synced),
      other => Err(mismatch(EventKind::Sync, &other)),
    }
  }
  .boxed()
}
