//! Cache layer that orchestrates caching logic with network fetching.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::CacheResult;
use crate::net::{Request, Response};

/// Cache layer bound to the current cache version.
///
/// Reads look through every cache; writes always land in the cache named
/// by the current version tag.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  cache_name: String,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: Arc<S>, cache_name: impl Into<String>) -> Self {
    Self {
      storage,
      cache_name: cache_name.into(),
    }
  }

  pub fn cache_name(&self) -> &str {
    &self.cache_name
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Store a response under `request` in the current cache.
  pub fn put(&self, request: &Request, response: Response) -> Result<()> {
    self.storage.put(&self.cache_name, request, response)
  }

  /// Answer a request cache-first.
  ///
  /// 1. Cache hit - return it
  /// 2. Miss - fetch from network; a 200 same-origin answer is split, one
  ///    copy is written to the current cache and the other returned
  /// 3. Any other network answer is returned untouched
  /// 4. Network failure, or a failed cache lookup - return the cached
  ///    `fallback` page
  ///
  /// A failed cache write is logged and never costs the caller its response.
  pub async fn respond<F, Fut>(
    &self,
    request: &Request,
    fallback: &Request,
    fetcher: F,
  ) -> Result<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    // Only GET requests are ever stored, so only they can hit
    if request.is_get() {
      match self.storage.match_any(request) {
        Ok(Some(cached)) => return Ok(CacheResult::from_cache(cached)),
        Ok(None) => {}
        Err(err) => return self.offline(request, fallback, err),
      }
    }

    match fetcher().await {
      Ok(response) => {
        if !request.is_get() || !response.is_cacheable() {
          return Ok(CacheResult::from_network(response));
        }

        let (response, to_cache) = response.split()?;
        if let Err(err) = self.put(request, to_cache) {
          warn!("Failed to cache {}: {}", request.identity(), err);
        }
        Ok(CacheResult::from_network(response))
      }
      Err(err) => self.offline(request, fallback, err),
    }
  }

  fn offline(
    &self,
    request: &Request,
    fallback: &Request,
    err: color_eyre::Report,
  ) -> Result<CacheResult<Response>> {
    debug!("Serving {} for {}: {}", fallback.url, request.identity(), err);
    match self.storage.match_any(fallback)? {
      Some(page) => Ok(CacheResult::offline(page)),
      None => Err(eyre!(
        "No response for {} and {} is not cached: {}",
        request.identity(),
        fallback.url,
        err
      )),
    }
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      cache_name: self.cache_name.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::traits::CacheKey;
  use crate::cache::{CacheInfo, CacheSource, SqliteStorage};
  use crate::db::Database;
  use crate::net::ResponseKind;
  use std::sync::atomic::{AtomicU32, Ordering};
  use url::Url;

  /// SQLite storage that can be told to fail writes or lookups.
  struct Faulty {
    inner: SqliteStorage,
    fail_put: bool,
    fail_lookup_of: Option<String>,
  }

  impl CacheStorage for Faulty {
    fn open(&self, cache: &str) -> Result<()> {
      self.inner.open(cache)
    }

    fn keys(&self) -> Result<Vec<String>> {
      self.inner.keys()
    }

    fn delete(&self, cache: &str) -> Result<bool> {
      self.inner.delete(cache)
    }

    fn put<K: CacheKey>(&self, cache: &str, key: &K, response: Response) -> Result<()> {
      if self.fail_put {
        return Err(eyre!("quota exceeded"));
      }
      self.inner.put(cache, key, response)
    }

    fn match_in<K: CacheKey>(&self, cache: &str, key: &K) -> Result<Option<Response>> {
      self.inner.match_in(cache, key)
    }

    fn match_any<K: CacheKey>(&self, key: &K) -> Result<Option<Response>> {
      if self.fail_lookup_of.as_deref() == Some(key.description().as_str()) {
        return Err(eyre!("database is locked"));
      }
      self.inner.match_any(key)
    }

    fn info(&self) -> Result<Vec<CacheInfo>> {
      self.inner.info()
    }
  }

  fn faulty(fail_put: bool, fail_lookup_of: Option<&Request>) -> CacheLayer<Faulty> {
    let storage = Faulty {
      inner: SqliteStorage::new(Arc::new(Database::open_in_memory().unwrap())),
      fail_put,
      fail_lookup_of: fail_lookup_of.map(|r| r.description()),
    };
    CacheLayer::new(Arc::new(storage), "haqpay-v1.0.0")
  }

  fn layer() -> CacheLayer<SqliteStorage> {
    let storage = SqliteStorage::new(Arc::new(Database::open_in_memory().unwrap()));
    CacheLayer::new(Arc::new(storage), "haqpay-v1.0.0")
  }

  fn request(path: &str) -> Request {
    Request::get(Url::parse("https://pay.example").unwrap().join(path).unwrap())
  }

  fn response(status: u16, kind: ResponseKind, body: &str) -> Response {
    Response::new(status, kind, vec![], body.as_bytes().to_vec())
  }

  #[tokio::test]
  async fn test_network_success_is_returned_and_cached() {
    let layer = layer();
    let req = request("/transfer.html");

    let mut result = layer
      .respond(&req, &request("/index.html"), || async {
        Ok(response(200, ResponseKind::Basic, "transfer"))
      })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.text().unwrap(), "transfer");

    let mut cached = layer
      .storage()
      .match_in("haqpay-v1.0.0", &req)
      .unwrap()
      .unwrap();
    assert_eq!(cached.text().unwrap(), "transfer");
  }

  #[tokio::test]
  async fn test_cache_hit_skips_network() {
    let layer = layer();
    let req = request("/bills.html");
    layer
      .put(&req, response(200, ResponseKind::Basic, "cached"))
      .unwrap();

    let calls = AtomicU32::new(0);
    let mut result = layer
      .respond(&req, &request("/index.html"), || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(response(200, ResponseKind::Basic, "fresh"))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data.text().unwrap(), "cached");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_uncacheable_responses_pass_through() {
    let layer = layer();
    let cases = [
      ("/missing.html", 404, ResponseKind::Basic),
      ("/moved.html", 301, ResponseKind::Basic),
      ("/avatar.svg", 200, ResponseKind::Cors),
      ("/opaque.js", 200, ResponseKind::Opaque),
    ];

    for (path, status, kind) in cases {
      let req = request(path);
      let result = layer
        .respond(&req, &request("/index.html"), || async {
          Ok(response(status, kind, "x"))
        })
        .await
        .unwrap();
      assert_eq!(result.data.status, status);
      assert_eq!(result.source, CacheSource::Network);
      assert!(layer.storage().match_any(&req).unwrap().is_none(), "{path}");
    }
  }

  #[tokio::test]
  async fn test_non_get_is_never_cached() {
    let layer = layer();
    let req = Request::new("POST", request("/api/transactions").url);

    layer
      .respond(&req, &request("/index.html"), || async {
        Ok(response(200, ResponseKind::Basic, "ok"))
      })
      .await
      .unwrap();

    assert!(layer.storage().match_any(&req).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_network_failure_serves_fallback_page() {
    let layer = layer();
    layer
      .put(&request("/index.html"), response(200, ResponseKind::Basic, "offline home"))
      .unwrap();

    let mut result = layer
      .respond(&request("/loan.html"), &request("/index.html"), || async {
        Err(eyre!("connection refused"))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.text().unwrap(), "offline home");
  }

  #[tokio::test]
  async fn test_network_failure_without_fallback_is_an_error() {
    let layer = layer();

    let result = layer
      .respond(&request("/loan.html"), &request("/index.html"), || async {
        Err(eyre!("connection refused"))
      })
      .await;

    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_cache_write_failure_still_returns_network_response() {
    let layer = faulty(true, None);
    let req = request("/transfer.html");

    let mut result = layer
      .respond(&req, &request("/index.html"), || async {
        Ok(response(200, ResponseKind::Basic, "transfer"))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.status, 200);
    assert_eq!(result.data.text().unwrap(), "transfer");
    assert!(layer.storage().match_any(&req).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_cache_lookup_failure_serves_fallback_page() {
    let req = request("/history.html");
    let layer = faulty(false, Some(&req));
    layer
      .put(&request("/index.html"), response(200, ResponseKind::Basic, "offline home"))
      .unwrap();

    let calls = AtomicU32::new(0);
    let mut result = layer
      .respond(&req, &request("/index.html"), || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(response(200, ResponseKind::Basic, "history"))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.text().unwrap(), "offline home");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }
}
