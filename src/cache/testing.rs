//! Shared test doubles for the cache layer.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::remote::{OutboundRequest, RemoteFetch};
use super::traits::CapturedResponse;

/// A scripted network: fixed routes, a global offline switch, and a call
/// counter so tests can assert whether the network was touched at all.
#[derive(Default)]
pub(crate) struct ScriptedRemote {
  routes: Mutex<HashMap<String, CapturedResponse>>,
  offline: AtomicBool,
  calls: AtomicUsize,
}

impl ScriptedRemote {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a response for `method` + path (optionally with query).
  pub fn serve(&self, method: &str, target: &str, status: u16, body: &[u8]) {
    let response = CapturedResponse {
      status,
      headers: vec![("content-type".into(), "text/plain".into())],
      body: body.to_vec(),
      fetched_at: Utc::now(),
    };

    self
      .routes
      .lock()
      .unwrap()
      .insert(route(method, target), response);
  }

  pub fn serve_json(&self, method: &str, target: &str, status: u16, body: &str) {
    let response = CapturedResponse {
      status,
      headers: vec![("content-type".into(), "application/json".into())],
      body: body.as_bytes().to_vec(),
      fetched_at: Utc::now(),
    };

    self
      .routes
      .lock()
      .unwrap()
      .insert(route(method, target), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

fn route(method: &str, target: &str) -> String {
  format!("{} {}", method.to_uppercase(), target)
}

#[async_trait]
impl RemoteFetch for ScriptedRemote {
  async fn fetch(&self, request: &OutboundRequest) -> Result<CapturedResponse> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("connection refused"));
    }

    let url = request.key.url();
    let target = match url.query() {
      Some(query) => format!("{}?{}", url.path(), query),
      None => url.path().to_string(),
    };

    let looked_up = self
      .routes
      .lock()
      .unwrap()
      .get(&route(request.key.method(), &target))
      .cloned();

    match looked_up {
      Some(mut response) => {
        response.fetched_at = Utc::now();
        Ok(response)
      }
      None => Err(eyre!("no route for {} {}", request.key.method(), target)),
    }
  }
}

/// Poll `cond` across scheduler yields until it holds, for asserting on
/// work done by detached tasks.
pub(crate) async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
  for _ in 0..50 {
    if cond() {
      return true;
    }
    tokio::task::yield_now().await;
  }
  cond()
}
