use color_eyre::{eyre::eyre, Result};
use url::Url;

/// How a request should treat intermediate HTTP caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
  #[default]
  Default,
  /// Revalidate with the origin, never answer from an HTTP cache
  NoCache,
}

/// An outgoing request. Identity (for cache lookups) is method + URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub cache_mode: CacheMode,
}

impl Request {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url,
      cache_mode: CacheMode::Default,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
    self.cache_mode = cache_mode;
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  /// Method and URL, the pair a cache entry is keyed by.
  pub fn identity(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// Where a response came from, relative to the worker's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
  /// Same-origin
  Basic,
  /// Cross-origin with readable body
  Cors,
  /// Cross-origin, body not readable by the page
  Opaque,
  Error,
}

impl ResponseKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseKind::Basic => "basic",
      ResponseKind::Cors => "cors",
      ResponseKind::Opaque => "opaque",
      ResponseKind::Error => "error",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(ResponseKind::Basic),
      "cors" => Some(ResponseKind::Cors),
      "opaque" => Some(ResponseKind::Opaque),
      "error" => Some(ResponseKind::Error),
      _ => None,
    }
  }
}

impl std::fmt::Display for ResponseKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A response whose body can be read exactly once.
///
/// To hand the same response to two consumers (the cache and the page),
/// [`Response::split`] it before reading.
#[derive(Debug)]
pub struct Response {
  pub status: u16,
  pub kind: ResponseKind,
  pub headers: Vec<(String, String)>,
  body: Option<Vec<u8>>,
}

impl Response {
  pub fn new(status: u16, kind: ResponseKind, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      kind,
      headers,
      body: Some(body),
    }
  }

  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Only complete same-origin answers are written through to the cache.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind == ResponseKind::Basic
  }

  pub fn body_used(&self) -> bool {
    self.body.is_none()
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Consume the body.
  pub fn take_body(&mut self) -> Result<Vec<u8>> {
    self
      .body
      .take()
      .ok_or_else(|| eyre!("Response body has already been used"))
  }

  pub fn text(&mut self) -> Result<String> {
    let body = self.take_body()?;
    String::from_utf8(body).map_err(|e| eyre!("Response body is not UTF-8: {}", e))
  }

  /// Turn one unread response into two independently readable copies.
  pub fn split(self) -> Result<(Response, Response)> {
    let body = self
      .body
      .ok_or_else(|| eyre!("Cannot split a response whose body has been used"))?;

    let copy = Response {
      status: self.status,
      kind: self.kind,
      headers: self.headers.clone(),
      body: Some(body.clone()),
    };
    let original = Response {
      status: self.status,
      kind: self.kind,
      headers: self.headers,
      body: Some(body),
    };
    Ok((original, copy))
  }
}
