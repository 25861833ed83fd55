//! Notifier and clients used when the worker runs from the command line.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;
use tracing::info;
use url::Url;

use crate::worker::{Clients, NotificationOptions, Notifier};

#[derive(Serialize)]
struct Shown<'a> {
  title: &'a str,
  #[serde(flatten)]
  options: &'a NotificationOptions,
}

/// Prints each notification as one JSON line.
pub struct JsonNotifier<W: Write + Send + 'static> {
  out: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonNotifier<W> {
  pub fn new(out: W) -> Self {
    Self {
      out: Mutex::new(out),
    }
  }
}

#[async_trait]
impl<W: Write + Send + 'static> Notifier for JsonNotifier<W> {
  async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()> {
    let line = serde_json::to_string(&Shown { title, options })?;
    let mut out = self
      .out
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
  }

  async fn close(&self, primary_key: u64) -> Result<()> {
    info!("Closed notification {}", primary_key);
    Ok(())
  }
}

/// Clients with no real windows behind them; requests are logged.
pub struct LogClients;

#[async_trait]
impl Clients for LogClients {
  async fn open_window(&self, url: &Url) -> Result<()> {
    info!("Opening window at {}", url);
    Ok(())
  }

  async fn claim(&self) -> Result<()> {
    info!("Claimed clients");
    Ok(())
  }
}
