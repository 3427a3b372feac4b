//! The request router: classifies every outbound request and applies the
//! matching caching strategy.
//!
//! Static assets are served cache-first from the install-time population;
//! API reads go network-first with an offline fallback to the last captured
//! snapshot; everything else passes through untouched.

use color_eyre::Result;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use super::assets::StaticAssetSet;
use super::remote::{OutboundRequest, RemoteFetch};
use super::traits::{Intercepted, RequestKey, StoreName, StoreProvider};

/// Routing facts shared by the interceptor and the lifecycle: where the
/// application lives, which paths are shell assets, which store versions
/// are current.
#[derive(Debug, Clone)]
pub struct CachePolicy {
  pub origin: Url,
  pub api_prefix: String,
  pub assets: StaticAssetSet,
  pub static_store: StoreName,
  pub api_store: StoreName,
}

/// How a request participates in caching. Derived per request, never
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  /// A member of the static asset set: cache-first.
  StaticAsset,
  /// A non-mutating read under the API prefix: network-first with
  /// fallback.
  ApiRead,
  /// No caching involvement.
  Other,
}

/// Classify a request against the policy.
///
/// Only same-origin traffic participates; anything else is passed through.
pub fn classify(key: &RequestKey, policy: &CachePolicy) -> Classification {
  if key.url().origin() != policy.origin.origin() {
    return Classification::Other;
  }

  if key.method() == "GET" && policy.assets.contains(key.path()) {
    return Classification::StaticAsset;
  }

  if key.is_read() && under_prefix(key.path(), &policy.api_prefix) {
    return Classification::ApiRead;
  }

  Classification::Other
}

fn under_prefix(path: &str, prefix: &str) -> bool {
  let prefix = prefix.trim_end_matches('/');
  match path.strip_prefix(prefix) {
    Some(rest) => rest.is_empty() || rest.starts_with('/'),
    None => false,
  }
}

/// Routes every outbound request through the configured strategies.
///
/// Reads only committed stores; its single write path is the detached
/// population of the API store after a successful live fetch.
pub struct FetchInterceptor<P, N> {
  stores: Arc<P>,
  remote: Arc<N>,
  policy: CachePolicy,
}

impl<P, N> FetchInterceptor<P, N>
where
  P: StoreProvider + 'static,
  N: RemoteFetch,
{
  pub fn new(stores: Arc<P>, remote: Arc<N>, policy: CachePolicy) -> Self {
    Self {
      stores,
      remote,
      policy,
    }
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  /// Run a request through classification and the matching strategy.
  pub async fn execute(&self, request: OutboundRequest) -> Result<Intercepted> {
    match classify(&request.key, &self.policy) {
      Classification::StaticAsset => self.cache_first(request).await,
      Classification::ApiRead => self.network_first(request).await,
      Classification::Other => {
        let response = self.remote.fetch(&request).await?;
        Ok(Intercepted::from_network(response))
      }
    }
  }

  /// Static assets: serve the install-time snapshot when present; fall
  /// back to a live fetch on a miss without caching the result, so the
  /// static set stays tied to what was installed.
  async fn cache_first(&self, request: OutboundRequest) -> Result<Intercepted> {
    if let Some(hit) = self.stores.get(&self.policy.static_store, &request.key)? {
      return Ok(Intercepted::cache_hit(hit));
    }

    let response = self.remote.fetch(&request).await?;
    Ok(Intercepted::from_network(response))
  }

  /// API reads: live fetch first. A reachable server wins outright and a
  /// snapshot of its answer is captured without delaying the caller; a
  /// transport failure falls back to the last snapshot, or propagates when
  /// there is none.
  async fn network_first(&self, request: OutboundRequest) -> Result<Intercepted> {
    match self.remote.fetch(&request).await {
      Ok(response) => {
        let stores = Arc::clone(&self.stores);
        let store = self.policy.api_store.clone();
        let key = request.key.clone();
        let snapshot = response.clone();
        tokio::spawn(async move {
          if let Err(e) = stores.put(&store, &key, &snapshot) {
            warn!("skipped caching {}: {}", key, e);
          }
        });

        Ok(Intercepted::from_network(response))
      }
      Err(network_err) => {
        let fallback = match self.stores.get(&self.policy.api_store, &request.key) {
          Ok(found) => found,
          Err(store_err) => {
            warn!("offline fallback lookup failed for {}: {}", request.key, store_err);
            None
          }
        };

        match fallback {
          Some(cached) => Ok(Intercepted::offline(cached)),
          None => Err(network_err),
        }
      }
    }
  }
}

impl<P, N> Clone for FetchInterceptor<P, N> {
  fn clone(&self) -> Self {
    Self {
      stores: Arc::clone(&self.stores),
      remote: Arc::clone(&self.remote),
      policy: self.policy.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStores;
  use crate::cache::testing::{eventually, ScriptedRemote};
  use crate::cache::traits::{ResponseSource, StoreKind};

  fn policy() -> CachePolicy {
    CachePolicy {
      origin: Url::parse("https://notes.example").unwrap(),
      api_prefix: "/api".into(),
      assets: StaticAssetSet::new(["/", "/index.html"]),
      static_store: StoreName::new(StoreKind::Static, "v1"),
      api_store: StoreName::new(StoreKind::Api, "v1"),
    }
  }

  fn interceptor(
    stores: Arc<MemoryStores>,
    remote: Arc<ScriptedRemote>,
  ) -> FetchInterceptor<MemoryStores, ScriptedRemote> {
    FetchInterceptor::new(stores, remote, policy())
  }

  fn request(method: &str, target: &str) -> OutboundRequest {
    let origin = Url::parse("https://notes.example").unwrap();
    OutboundRequest::new(RequestKey::resolve(method, &origin, target).unwrap())
  }

  #[test]
  fn test_classification() {
    let policy = policy();
    let classify_target =
      |method: &str, target: &str| classify(&request(method, target).key, &policy);

    assert_eq!(classify_target("GET", "/"), Classification::StaticAsset);
    assert_eq!(
      classify_target("GET", "/index.html"),
      Classification::StaticAsset
    );
    assert_eq!(classify_target("GET", "/api/notes"), Classification::ApiRead);
    assert_eq!(
      classify_target("GET", "/api/notes?search=x"),
      Classification::ApiRead
    );
    assert_eq!(classify_target("HEAD", "/api/notes"), Classification::ApiRead);

    // Mutations never participate
    assert_eq!(classify_target("POST", "/api/notes"), Classification::Other);
    assert_eq!(
      classify_target("DELETE", "/api/notes/1"),
      Classification::Other
    );
    // Unlisted paths outside the API namespace pass through
    assert_eq!(classify_target("GET", "/other.txt"), Classification::Other);
    // Prefix match is per path segment
    assert_eq!(classify_target("GET", "/apiary"), Classification::Other);
    // Cross-origin traffic passes through
    assert_eq!(
      classify(
        &request("GET", "https://cdn.example/index.html").key,
        &policy
      ),
      Classification::Other
    );
  }

  #[tokio::test]
  async fn test_static_hit_never_touches_network() {
    let stores = Arc::new(MemoryStores::new());
    let remote = Arc::new(ScriptedRemote::new());
    let shell = request("GET", "/");
    let cached = crate::cache::traits::CapturedResponse {
      status: 200,
      headers: vec![],
      body: b"installed shell".to_vec(),
      fetched_at: chrono::Utc::now(),
    };
    stores
      .put(&policy().static_store, &shell.key, &cached)
      .unwrap();

    let interceptor = interceptor(stores, Arc::clone(&remote));
    let result = interceptor.execute(shell).await.unwrap();

    assert_eq!(result.source, ResponseSource::CacheHit);
    assert_eq!(result.response.body, b"installed shell");
    assert_eq!(remote.calls(), 0);
  }

  #[tokio::test]
  async fn test_static_miss_fetches_live_without_populating() {
    let stores = Arc::new(MemoryStores::new());
    let remote = Arc::new(ScriptedRemote::new());
    remote.serve("GET", "/index.html", 200, b"live shell");

    let interceptor = interceptor(Arc::clone(&stores), remote);
    let result = interceptor.execute(request("GET", "/index.html")).await.unwrap();

    assert_eq!(result.source, ResponseSource::Network);
    assert_eq!(result.response.body, b"live shell");

    // Population happens only at install time
    tokio::task::yield_now().await;
    assert!(stores
      .get(&policy().static_store, &request("GET", "/index.html").key)
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_api_read_populates_store_eventually() {
    let stores = Arc::new(MemoryStores::new());
    let remote = Arc::new(ScriptedRemote::new());
    remote.serve_json("GET", "/api/notes", 200, r#"{"success":true,"data":[]}"#);

    let interceptor = interceptor(Arc::clone(&stores), remote);
    let result = interceptor.execute(request("GET", "/api/notes")).await.unwrap();
    assert_eq!(result.source, ResponseSource::Network);

    let key = request("GET", "/api/notes").key;
    let populated = eventually(|| {
      stores
        .get(&policy().api_store, &key)
        .unwrap()
        .is_some()
    })
    .await;
    assert!(populated);

    let cached = stores.get(&policy().api_store, &key).unwrap().unwrap();
    assert_eq!(cached.body, result.response.body);
  }

  #[tokio::test]
  async fn test_api_read_falls_back_when_offline() {
    let stores = Arc::new(MemoryStores::new());
    let remote = Arc::new(ScriptedRemote::new());
    remote.serve_json("GET", "/api/notes", 200, r#"{"success":true,"data":[1]}"#);

    let interceptor = interceptor(Arc::clone(&stores), Arc::clone(&remote));
    interceptor
      .execute(request("GET", "/api/notes"))
      .await
      .unwrap();

    let key = request("GET", "/api/notes").key;
    assert!(eventually(|| stores.get(&policy().api_store, &key).unwrap().is_some()).await);

    remote.set_offline(true);
    let result = interceptor
      .execute(request("GET", "/api/notes"))
      .await
      .unwrap();

    assert_eq!(result.source, ResponseSource::Offline);
    assert_eq!(result.response.body, br#"{"success":true,"data":[1]}"#);
  }

  #[tokio::test]
  async fn test_api_read_offline_without_snapshot_propagates() {
    let stores = Arc::new(MemoryStores::new());
    let remote = Arc::new(ScriptedRemote::new());
    remote.set_offline(true);

    let interceptor = interceptor(stores, remote);
    let err = interceptor
      .execute(request("GET", "/api/notes"))
      .await
      .unwrap_err();

    assert!(err.to_string().contains("connection refused"));
  }

  #[tokio::test]
  async fn test_api_error_status_is_returned_and_captured() {
    let stores = Arc::new(MemoryStores::new());
    let remote = Arc::new(ScriptedRemote::new());
    remote.serve_json("GET", "/api/notes", 500, r#"{"success":false}"#);

    let interceptor = interceptor(Arc::clone(&stores), remote);
    let result = interceptor.execute(request("GET", "/api/notes")).await.unwrap();

    // HTTP errors are not transport failures: returned as-is, snapshot kept
    assert_eq!(result.source, ResponseSource::Network);
    assert_eq!(result.response.status, 500);

    let key = request("GET", "/api/notes").key;
    assert!(eventually(|| stores.get(&policy().api_store, &key).unwrap().is_some()).await);
  }

  #[tokio::test]
  async fn test_mutations_pass_through_uncached() {
    let stores = Arc::new(MemoryStores::new());
    let remote = Arc::new(ScriptedRemote::new());
    remote.serve_json("POST", "/api/notes", 201, r#"{"success":true}"#);

    let interceptor = interceptor(Arc::clone(&stores), remote);
    let result = interceptor
      .execute(request("POST", "/api/notes").with_json_body(b"{}".to_vec()))
      .await
      .unwrap();

    assert_eq!(result.response.status, 201);
    tokio::task::yield_now().await;
    assert!(stores.list_keys(&policy().api_store).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_distinct_queries_cache_separately() {
    let stores = Arc::new(MemoryStores::new());
    let remote = Arc::new(ScriptedRemote::new());
    remote.serve_json("GET", "/api/notes", 200, r#"{"data":"all"}"#);
    remote.serve_json("GET", "/api/notes?search=rust", 200, r#"{"data":"rust"}"#);

    let interceptor = interceptor(Arc::clone(&stores), Arc::clone(&remote));
    interceptor
      .execute(request("GET", "/api/notes"))
      .await
      .unwrap();
    interceptor
      .execute(request("GET", "/api/notes?search=rust"))
      .await
      .unwrap();

    let api_store = policy().api_store;
    assert!(eventually(|| stores.list_keys(&api_store).unwrap().len() == 2).await);

    remote.set_offline(true);
    let searched = interceptor
      .execute(request("GET", "/api/notes?search=rust"))
      .await
      .unwrap();
    assert_eq!(searched.response.body, br#"{"data":"rust"}"#);
  }
}
