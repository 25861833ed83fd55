//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use super::traits::CacheKey;
use crate::db::Database;
use crate::net::{Response, ResponseKind};

/// Summary of one named cache.
#[derive(Debug, Clone)]
pub struct CacheInfo {
  pub name: String,
  pub created_at: DateTime<Utc>,
  pub entries: usize,
}

/// Trait for cache storage backends.
///
/// Mirrors Cache Storage: a set of named caches, each mapping request
/// identity to a full response.
pub trait CacheStorage: Send + Sync {
  /// Create the named cache if it does not exist yet.
  fn open(&self, cache: &str) -> Result<()>;

  /// Names of all caches, oldest first.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a cache and everything in it. Returns whether it existed.
  fn delete(&self, cache: &str) -> Result<bool>;

  /// Store a response in the named cache, creating the cache if needed.
  fn put<K: CacheKey>(&self, cache: &str, key: &K, response: Response) -> Result<()>;

  /// Look the key up in one cache.
  fn match_in<K: CacheKey>(&self, cache: &str, key: &K) -> Result<Option<Response>>;

  /// Look the key up across all caches, oldest cache first.
  fn match_any<K: CacheKey>(&self, key: &K) -> Result<Option<Response>>;

  /// Describe every cache.
  fn info(&self) -> Result<Vec<CacheInfo>>;
}

/// SQLite-based cache storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

type Row = (u16, String, String, Vec<u8>);

fn into_response((status, kind, headers, body): Row) -> Result<Response> {
  let kind = ResponseKind::parse(&kind).ok_or_else(|| eyre!("Unknown response kind '{}'", kind))?;
  let headers: Vec<(String, String)> =
    serde_json::from_str(&headers).map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
  Ok(Response::new(status, kind, headers, body))
}

impl CacheStorage for SqliteStorage {
  fn open(&self, cache: &str) -> Result<()> {
    self
      .db
      .conn()?
      .execute(
        "INSERT OR IGNORE INTO caches (name) VALUES (?)",
        params![cache],
      )
      .map_err(|e| eyre!("Failed to open cache {}: {}", cache, e))?;
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, cache: &str) -> Result<bool> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE cache_name = ?",
      params![cache],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", cache, e))?;
    let removed = tx
      .execute("DELETE FROM caches WHERE name = ?", params![cache])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn put<K: CacheKey>(&self, cache: &str, key: &K, mut response: Response) -> Result<()> {
    let body = response.take_body()?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO caches (name) VALUES (?)",
      params![cache],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", cache, e))?;

    tx.execute(
      "INSERT OR REPLACE INTO cache_entries
         (cache_name, request_hash, request_description, status, kind, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache,
        key.cache_hash(),
        key.description(),
        response.status,
        response.kind.as_str(),
        headers,
        body
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key.description(), e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn match_in<K: CacheKey>(&self, cache: &str, key: &K) -> Result<Option<Response>> {
    let row: Option<Row> = self
      .db
      .conn()?
      .query_row(
        "SELECT status, kind, headers, body FROM cache_entries
         WHERE cache_name = ? AND request_hash = ?",
        params![cache, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key.description(), e))?;

    row.map(into_response).transpose()
  }

  fn match_any<K: CacheKey>(&self, key: &K) -> Result<Option<Response>> {
    let row: Option<Row> = self
      .db
      .conn()?
      .query_row(
        "SELECT e.status, e.kind, e.headers, e.body FROM cache_entries e
         INNER JOIN caches c ON c.name = e.cache_name
         WHERE e.request_hash = ?
         ORDER BY c.rowid
         LIMIT 1",
        params![key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key.description(), e))?;

    row.map(into_response).transpose()
  }

  fn info(&self) -> Result<Vec<CacheInfo>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT c.name, c.created_at, COUNT(e.request_hash) FROM caches c
         LEFT JOIN cache_entries e ON e.cache_name = c.name
         GROUP BY c.name
         ORDER BY c.rowid",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, i64>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache row: {}", e))?;

    rows
      .into_iter()
      .map(|(name, created_at, entries)| {
        Ok(CacheInfo {
          name,
          created_at: parse_datetime(&created_at)?,
          entries: entries as usize,
        })
      })
      .collect()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
