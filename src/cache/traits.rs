//! Core types for the offline cache: store identities, request identities,
//! captured responses, and the storage provider trait.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Which of the two cache stores an identity refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKind {
  /// Build-time shell assets, populated only at install time.
  Static,
  /// API read responses, populated opportunistically on successful fetches.
  Api,
}

impl StoreKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      StoreKind::Static => "static",
      StoreKind::Api => "api",
    }
  }

  pub fn parse(s: &str) -> Option<StoreKind> {
    match s {
      "static" => Some(StoreKind::Static),
      "api" => Some(StoreKind::Api),
      _ => None,
    }
  }
}

/// Identity of a cache store.
///
/// Version is a first-class field rather than being embedded in a composite
/// name; the rendered form (e.g. `static-v1`) is for display only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreName {
  pub kind: StoreKind,
  pub version: String,
}

impl StoreName {
  pub fn new(kind: StoreKind, version: impl Into<String>) -> Self {
    Self {
      kind,
      version: version.into(),
    }
  }
}

impl fmt::Display for StoreName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.kind.as_str(), self.version)
  }
}

/// Normalized identity of an outbound request: uppercased method plus the
/// canonicalized absolute URL (fragment stripped, query preserved).
///
/// Entries are keyed by a SHA-256 digest of the identity so keys stay a
/// stable, fixed length regardless of URL size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  method: String,
  url: Url,
}

impl RequestKey {
  pub fn new(method: &str, mut url: Url) -> Self {
    url.set_fragment(None);
    Self {
      method: method.to_uppercase(),
      url,
    }
  }

  /// Build a key by resolving `target` against `origin`.
  ///
  /// `target` may be a path (`/api/notes`) or an absolute URL; absolute
  /// targets keep their own origin so cross-origin requests stay
  /// distinguishable.
  pub fn resolve(method: &str, origin: &Url, target: &str) -> Result<Self> {
    let url = match Url::parse(target) {
      Ok(absolute) => absolute,
      Err(url::ParseError::RelativeUrlWithoutBase) => origin
        .join(target)
        .map_err(|e| eyre!("Cannot resolve request target '{}': {}", target, e))?,
      Err(e) => return Err(eyre!("Invalid request target '{}': {}", target, e)),
    };

    Ok(Self::new(method, url))
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }

  /// Whether the method is a non-mutating read.
  pub fn is_read(&self) -> bool {
    matches!(self.method.as_str(), "GET" | "HEAD")
  }

  /// Human-readable identity, e.g. `GET https://host/api/notes`.
  pub fn identity(&self) -> String {
    format!("{} {}", self.method, self.url)
  }

  /// Stable fixed-length digest of the identity, used as the entry key.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.identity().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// An immutable snapshot of a fetched response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedResponse {
  pub status: u16,
  /// Header name/value pairs in arrival order.
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  /// When the response was fetched from the network.
  pub fetched_at: DateTime<Utc>,
}

impl CapturedResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First header value matching `name` (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(&self.body)
  }
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network.
  Network,
  /// Served from the static store without touching the network.
  CacheHit,
  /// Network unavailable, serving the last captured snapshot.
  Offline,
}

impl fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ResponseSource::Network => "network",
      ResponseSource::CacheHit => "cache",
      ResponseSource::Offline => "offline",
    };
    f.write_str(s)
  }
}

/// Result of running a request through the interceptor.
#[derive(Debug, Clone)]
pub struct Intercepted {
  pub response: CapturedResponse,
  pub source: ResponseSource,
}

impl Intercepted {
  pub fn from_network(response: CapturedResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  pub fn cache_hit(response: CapturedResponse) -> Self {
    Self {
      response,
      source: ResponseSource::CacheHit,
    }
  }

  pub fn offline(response: CapturedResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Offline,
    }
  }
}

/// Trait for cache store backends.
///
/// Stores are named key→response maps with last-write-wins semantics per
/// key. `put` must be durable before it returns; `get` never touches the
/// network.
pub trait StoreProvider: Send + Sync {
  /// Store or overwrite the entry for `key` in `store`.
  fn put(&self, store: &StoreName, key: &RequestKey, response: &CapturedResponse) -> Result<()>;

  /// Most recently written entry for `key`, or None.
  fn get(&self, store: &StoreName, key: &RequestKey) -> Result<Option<CapturedResponse>>;

  /// Remove an entire store and all its entries. Returns whether the store
  /// existed.
  fn delete_store(&self, store: &StoreName) -> Result<bool>;

  /// Identities of all stores currently persisted.
  fn list_stores(&self) -> Result<Vec<StoreName>>;

  /// Readable request identities of every entry in `store`.
  fn list_keys(&self, store: &StoreName) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_store_name_display() {
    let name = StoreName::new(StoreKind::Static, "v1");
    assert_eq!(name.to_string(), "static-v1");
    assert_eq!(StoreName::new(StoreKind::Api, "v2").to_string(), "api-v2");
  }

  #[test]
  fn test_store_kind_roundtrip() {
    assert_eq!(StoreKind::parse("static"), Some(StoreKind::Static));
    assert_eq!(StoreKind::parse("api"), Some(StoreKind::Api));
    assert_eq!(StoreKind::parse("sessions"), None);
  }

  #[test]
  fn test_request_key_normalizes_method_and_fragment() {
    let origin = Url::parse("https://notes.example").unwrap();
    let a = RequestKey::resolve("get", &origin, "/api/notes#section").unwrap();
    let b = RequestKey::resolve("GET", &origin, "/api/notes").unwrap();

    assert_eq!(a.method(), "GET");
    assert_eq!(a.identity(), b.identity());
    assert_eq!(a.digest(), b.digest());
  }

  #[test]
  fn test_request_key_preserves_query() {
    let origin = Url::parse("https://notes.example").unwrap();
    let plain = RequestKey::resolve("GET", &origin, "/api/notes").unwrap();
    let searched = RequestKey::resolve("GET", &origin, "/api/notes?search=rust").unwrap();

    assert_ne!(plain.digest(), searched.digest());
    assert_eq!(searched.path(), "/api/notes");
  }

  #[test]
  fn test_request_key_absolute_target_keeps_origin() {
    let origin = Url::parse("https://notes.example").unwrap();
    let external = RequestKey::resolve("GET", &origin, "https://cdn.example/lib.js").unwrap();
    assert_eq!(external.url().host_str(), Some("cdn.example"));
  }

  #[test]
  fn test_captured_response_helpers() {
    let response = CapturedResponse {
      status: 200,
      headers: vec![("Content-Type".into(), "application/json".into())],
      body: b"{}".to_vec(),
      fetched_at: Utc::now(),
    };

    assert!(response.is_success());
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(response.header("etag"), None);
    assert_eq!(response.body_text(), "{}");
  }
}
