use color_eyre::Result;
use std::sync::Arc;

use super::Worker;
use crate::cache::{CacheResult, CacheStorage};
use crate::net::{Request, Response};

impl<S: CacheStorage> Worker<S> {
  /// Answer an intercepted request: cache, then network, then offline page.
  pub async fn respond(&self, request: &Request) -> Result<CacheResult<Response>> {
    let fallback = Request::get(self.resolve(&self.config.cache.offline_page)?);
    let network = Arc::clone(&self.host.network);

    self
      .cache
      .respond(request, &fallback, || async move { network.fetch(request).await })
      .await
  }

  pub async fn fetch(&self, method: &str, path: &str) -> Result<CacheResult<Response>> {
    let request = Request::new(method, self.resolve(path)?);
    self.respond(&request).await
  }
}

#[cfg(test)]
mod tests {
  use crate::cache::{CacheSource, CacheStorage};
  use crate::net::{Request, ResponseKind};
  use crate::worker::testing::{FakeNetwork, Harness};

  #[tokio::test]
  async fn test_miss_then_hit() {
    let network = FakeNetwork::new().page("/history.html", 200, ResponseKind::Basic, "history");
    let h = Harness::new(network);

    let mut first = h.worker.fetch("GET", "/history.html").await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data.text().unwrap(), "history");

    let mut second = h.worker.fetch("GET", "/history.html").await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data.text().unwrap(), "history");

    assert_eq!(h.network.fetched().len(), 1);
  }

  #[tokio::test]
  async fn test_successful_fetch_lands_in_current_cache() {
    let network = FakeNetwork::new().page("/reward.html", 200, ResponseKind::Basic, "reward");
    let h = Harness::new(network);

    h.worker.fetch("GET", "/reward.html").await.unwrap();

    let req = Request::get(h.worker.resolve("/reward.html").unwrap());
    assert!(h.storage.match_in("haqpay-v1.0.0", &req).unwrap().is_some());
  }

  #[tokio::test]
  async fn test_offline_falls_back_to_index() {
    let network = FakeNetwork::new().page("/index.html", 200, ResponseKind::Basic, "home");
    let h = Harness::new(network);
    h.worker.fetch("GET", "/index.html").await.unwrap();

    h.network.set_offline(true);
    let mut result = h.worker.fetch("GET", "/data.html").await.unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.text().unwrap(), "home");
  }

  #[tokio::test]
  async fn test_cross_origin_is_not_cached() {
    let network = FakeNetwork::new().page("/7.x/identicon/svg", 200, ResponseKind::Cors, "<svg/>");
    let h = Harness::new(network);

    let url = "https://api.dicebear.com/7.x/identicon/svg";
    h.worker.fetch("GET", url).await.unwrap();

    let req = Request::get(h.worker.resolve(url).unwrap());
    assert!(h.storage.match_any(&req).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_entries_from_older_caches_still_answer() {
    let h = Harness::new(FakeNetwork::new());
    let req = Request::get(h.worker.resolve("/more.html").unwrap());
    h.storage
      .put(
        "haqpay-v0.9.0",
        &req,
        crate::net::Response::new(200, ResponseKind::Basic, vec![], b"old".to_vec()),
      )
      .unwrap();

    let mut result = h.worker.fetch("GET", "/more.html").await.unwrap();
    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data.text().unwrap(), "old");
  }
}
