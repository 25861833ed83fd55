use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::types::{CacheMode, Request, Response, ResponseKind};

/// The network as seen by the worker.
///
/// `Err` means the request never produced a response (offline, DNS, TLS).
/// HTTP error statuses are still `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;

  /// POST `body` as JSON to `url`.
  async fn post_json(&self, url: &Url, body: &Value) -> Result<Response>;
}

/// `reqwest`-backed network rooted at the app origin.
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
  origin: Url,
}

impl HttpClient {
  pub fn new(origin: Url, timeout: Option<Duration>) -> Result<Self> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  async fn into_response(&self, res: reqwest::Response) -> Result<Response> {
    let status = res.status().as_u16();
    let kind = response_kind(&self.origin, res.url());
    let headers = res
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
      .collect();
    let body = res
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body: {}", e))?;

    Ok(Response::new(status, kind, headers, body.to_vec()))
  }
}

#[async_trait]
impl Network for HttpClient {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    if request.cache_mode == CacheMode::NoCache {
      builder = builder
        .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
        .header(PRAGMA, HeaderValue::from_static("no-cache"));
    }

    let res = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    self.into_response(res).await
  }

  async fn post_json(&self, url: &Url, body: &Value) -> Result<Response> {
    let payload =
      serde_json::to_vec(body).map_err(|e| eyre!("Failed to serialize request body: {}", e))?;

    let res = self
      .client
      .post(url.clone())
      .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
      .body(payload)
      .send()
      .await
      .map_err(|e| eyre!("Failed to post to {}: {}", url, e))?;

    self.into_response(res).await
  }
}

/// Responses from the app origin are `basic`, everything else `cors`.
fn response_kind(origin: &Url, url: &Url) -> ResponseKind {
  if url.origin() == origin.origin() {
    ResponseKind::Basic
  } else {
    ResponseKind::Cors
  }
}
