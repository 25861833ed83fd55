//! Push notifications and notification clicks.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::Result;
use serde::Serialize;
use url::Url;

use super::Worker;
use crate::cache::CacheStorage;

pub const OPEN_ACTION: &str = "open";
pub const CLOSE_ACTION: &str = "close";

/// Identifies the worker's notification; there is only ever one kind.
pub const PRIMARY_KEY: u64 = 1;

/// Displays notifications to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()>;

  async fn close(&self, primary_key: u64) -> Result<()>;
}

/// The page clients controlled by the worker.
#[async_trait]
pub trait Clients: Send + Sync {
  /// Open (or focus) a window on `url`.
  async fn open_window(&self, url: &Url) -> Result<()>;

  /// Take control of already open pages without a reload.
  async fn claim(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOptions {
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  /// Milliseconds since the epoch
  pub date_of_arrival: i64,
  pub primary_key: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

impl<S: CacheStorage> Worker<S> {
  pub fn notification_options(&self, payload: Option<&str>) -> NotificationOptions {
    let n = &self.config.notifications;
    NotificationOptions {
      body: payload
        .map(str::to_string)
        .unwrap_or_else(|| n.default_body.clone()),
      icon: n.icon.clone(),
      badge: n.badge.clone(),
      vibrate: n.vibrate.clone(),
      data: NotificationData {
        date_of_arrival: Utc::now().timestamp_millis(),
        primary_key: PRIMARY_KEY,
      },
      actions: vec![
        NotificationAction {
          action: OPEN_ACTION.to_string(),
          title: "Open App".to_string(),
        },
        NotificationAction {
          action: CLOSE_ACTION.to_string(),
          title: "Close".to_string(),
        },
      ],
    }
  }

  /// Show a notification for a push message.
  pub async fn push(&self, payload: Option<&str>) -> Result<NotificationOptions> {
    let options = self.notification_options(payload);
    self
      .host
      .notifier
      .show(&self.config.notifications.title, &options)
      .await?;
    Ok(options)
  }

  /// Dismiss the clicked notification; the "open" action also opens the app.
  ///
  /// Returns the URL that was opened, if any.
  pub async fn notification_click(
    &self,
    action: Option<&str>,
    primary_key: u64,
  ) -> Result<Option<Url>> {
    self.host.notifier.close(primary_key).await?;

    if action != Some(OPEN_ACTION) {
      return Ok(None);
    }

    let url = self.resolve(&self.config.notifications.open_url)?;
    self.host.clients.open_window(&url).await?;
    Ok(Some(url))
  }
}
