use color_eyre::{eyre::bail, Result};
use tracing::{info, warn};

use super::{Worker, WorkerState};
use crate::cache::CacheStorage;
use crate::net::{CacheMode, Request};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  pub cached: Vec<String>,
  pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
  /// Caches from previous versions that were removed
  pub deleted: Vec<String>,
}

impl<S: CacheStorage> Worker<S> {
  /// Prime the current cache with the precache list, then skip waiting.
  ///
  /// Each page is fetched on its own; one failing page is logged and does
  /// not fail the install.
  pub async fn install(&self) -> Result<InstallReport> {
    self.update_lifecycle(|l| l.state = WorkerState::Installing)?;

    match self.precache().await {
      Ok(report) => {
        self.update_lifecycle(|l| {
          l.state = WorkerState::Installed;
          l.skip_waiting = true;
        })?;
        info!(
          "Installed {}: {} cached, {} failed",
          self.cache.cache_name(),
          report.cached.len(),
          report.failed.len()
        );
        Ok(report)
      }
      Err(err) => {
        self.update_lifecycle(|l| l.state = WorkerState::Redundant)?;
        Err(err)
      }
    }
  }

  async fn precache(&self) -> Result<InstallReport> {
    self.cache.storage().open(self.cache.cache_name())?;
    info!("Opened cache {}", self.cache.cache_name());

    let mut report = InstallReport::default();
    for path in &self.config.cache.precache {
      match self.prime(path).await {
        Ok(()) => report.cached.push(path.clone()),
        Err(err) => {
          warn!("Cache addAll error for {}: {}", path, err);
          report.failed.push(path.clone());
        }
      }
    }

    Ok(report)
  }

  async fn prime(&self, path: &str) -> Result<()> {
    let request = Request::get(self.resolve(path)?).with_cache_mode(CacheMode::NoCache);
    let response = self.host.network.fetch(&request).await?;
    if !response.is_ok() {
      bail!("{} answered with status {}", request.url, response.status);
    }
    self.cache.put(&request, response)
  }

  /// Delete every cache but the current version, then claim open clients.
  pub async fn activate(&self) -> Result<ActivateReport> {
    self.update_lifecycle(|l| l.state = WorkerState::Activating)?;

    let current = self.cache.cache_name();
    let mut report = ActivateReport::default();
    for name in self.cache.storage().keys()? {
      if name != current {
        info!("Deleting old cache: {}", name);
        self.cache.storage().delete(&name)?;
        report.deleted.push(name);
      }
    }

    self.host.clients.claim().await?;
    self.update_lifecycle(|l| {
      l.state = WorkerState::Activated;
      l.clients_claimed = true;
    })?;

    Ok(report)
  }
}
