//! Offline cache layer: versioned response stores, the install/activate
//! lifecycle that maintains them, and the request interceptor that serves
//! from them.
//!
//! The layer sits between the application and the network and applies one
//! of two strategies per request:
//! - cache-first for the fixed static asset set (populated at install time)
//! - network-first with offline fallback for API reads
//!
//! Everything else passes through untouched. Stores are pruned by version
//! on activation; there is no per-entry expiry.

mod assets;
mod interceptor;
mod lifecycle;
mod notify;
mod remote;
mod storage;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use assets::StaticAssetSet;
pub use interceptor::{classify, CachePolicy, Classification, FetchInterceptor};
pub use lifecycle::{LifecycleManager, LifecyclePhase};
pub use notify::{update_channel, UpdateEvents, UpdateNotifier};
pub use remote::{HttpRemote, OutboundRequest, RemoteFetch};
pub use storage::{MemoryStores, SqliteStores};
pub use traits::{
  CapturedResponse, Intercepted, RequestKey, ResponseSource, StoreKind, StoreName, StoreProvider,
};

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::{eventually, ScriptedRemote};
  use std::sync::Arc;
  use url::Url;

  fn policy(version: &str) -> CachePolicy {
    CachePolicy {
      origin: Url::parse("https://notes.example").unwrap(),
      api_prefix: "/api".into(),
      assets: StaticAssetSet::new(["/", "/index.html"]),
      static_store: StoreName::new(StoreKind::Static, version),
      api_store: StoreName::new(StoreKind::Api, version),
    }
  }

  fn request(method: &str, target: &str) -> OutboundRequest {
    let origin = Url::parse("https://notes.example").unwrap();
    OutboundRequest::new(RequestKey::resolve(method, &origin, target).unwrap())
  }

  /// Install the shell, lose the network, and the root document still
  /// serves from cache without a single network attempt.
  #[tokio::test]
  async fn test_offline_shell_after_install() {
    let stores = Arc::new(MemoryStores::new());
    let remote = Arc::new(ScriptedRemote::new());
    remote.serve("GET", "/", 200, b"<html>shell</html>");
    remote.serve("GET", "/index.html", 200, b"<html>shell</html>");

    let (notifier, _events) = update_channel();
    let manager = LifecycleManager::new(
      Arc::clone(&stores),
      Arc::clone(&remote),
      policy("v1"),
      notifier,
    );
    manager.register().await.unwrap();

    remote.set_offline(true);
    let calls_before = remote.calls();

    let interceptor = FetchInterceptor::new(stores, Arc::clone(&remote), policy("v1"));
    let result = interceptor.execute(request("GET", "/")).await.unwrap();

    assert_eq!(result.source, ResponseSource::CacheHit);
    assert!(result.response.is_success());
    assert_eq!(result.response.body, b"<html>shell</html>");
    assert_eq!(remote.calls(), calls_before);
  }

  /// A note listing fetched once while online comes back unchanged after
  /// the network disappears.
  #[tokio::test]
  async fn test_api_listing_survives_network_loss() {
    let stores = Arc::new(MemoryStores::new());
    let remote = Arc::new(ScriptedRemote::new());
    let body = r#"{"success":true,"data":[{"_id":"n1"}]}"#;
    remote.serve_json("GET", "/api/notes", 200, body);

    let interceptor =
      FetchInterceptor::new(Arc::clone(&stores), Arc::clone(&remote), policy("v1"));

    let online = interceptor.execute(request("GET", "/api/notes")).await.unwrap();
    assert_eq!(online.source, ResponseSource::Network);

    let key = request("GET", "/api/notes").key;
    let api_store = StoreName::new(StoreKind::Api, "v1");
    assert!(eventually(|| stores.get(&api_store, &key).unwrap().is_some()).await);

    remote.set_offline(true);
    let offline = interceptor.execute(request("GET", "/api/notes")).await.unwrap();

    assert_eq!(offline.source, ResponseSource::Offline);
    assert_eq!(offline.response.body, online.response.body);
  }
}
