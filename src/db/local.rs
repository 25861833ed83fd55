//! String key/value storage, the worker's stand-in for `localStorage`.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use super::Database;
use crate::worker::sync::QueueStore;

#[derive(Clone)]
pub struct LocalStorage {
  db: Arc<Database>,
}

impl LocalStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  pub fn remove_item(&self, key: &str) -> Result<()> {
    self
      .db
      .conn()?
      .execute("DELETE FROM local_storage WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove {}: {}", key, e))?;
    Ok(())
  }
}

impl QueueStore for LocalStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    self
      .db
      .conn()?
      .query_row(
        "SELECT value FROM local_storage WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    self
      .db
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO local_storage (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;
    Ok(())
  }
}
