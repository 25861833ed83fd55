use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::db::Database;

/// Pages primed into the cache at install.
const DEFAULT_PRECACHE: &[&str] = &[
  "/",
  "/index.html",
  "/login.html",
  "/signup.html",
  "/more.html",
  "/transfer.html",
  "/airtime.html",
  "/data.html",
  "/bills.html",
  "/card.html",
  "/reward.html",
  "/history.html",
  "/loan.html",
  "/finance.html",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the app is served from; relative paths resolve against it
  pub origin: String,
  /// SQLite file holding caches and local storage
  pub database: Option<PathBuf>,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  pub notifications: NotificationConfig,
  pub network: NetworkConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Cache name; bump it to evict every older cache on activate
  pub version: String,
  pub precache: Vec<String>,
  /// Served when a request misses the cache and the network is down
  pub offline_page: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub tag: String,
  pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  /// Opened when the "open" action is clicked
  pub open_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  /// Request timeout; unset means requests may hang indefinitely
  pub timeout_secs: Option<u64>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      database: None,
      cache: CacheConfig::default(),
      sync: SyncConfig::default(),
      notifications: NotificationConfig::default(),
      network: NetworkConfig::default(),
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "haqpay-v1.0.0".to_string(),
      precache: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
      offline_page: "/index.html".to_string(),
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "sync-transactions".to_string(),
      endpoint: "/api/transactions".to_string(),
    }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "HaqPay".to_string(),
      default_body: "New notification from HaqPay".to_string(),
      icon: "https://api.dicebear.com/7.x/identicon/svg?seed=HaqPay&backgroundColor=008037&size=192"
        .to_string(),
      badge: "https://api.dicebear.com/7.x/identicon/svg?seed=HaqPay&backgroundColor=008037&size=96"
        .to_string(),
      vibrate: vec![200, 100, 200],
      open_url: "/".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./payworker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/payworker/config.yaml
  ///
  /// With no file found the built-in defaults are used.
  /// `PAYWORKER_ORIGIN` overrides the origin either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(origin) = std::env::var("PAYWORKER_ORIGIN") {
      config.origin = origin;
    }

    config.origin_url()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("payworker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("payworker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => Database::default_path(),
    }
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.network.timeout_secs.map(Duration::from_secs)
  }
}
