//! The live-network seam: outbound requests and the fetch trait the
//! interceptor and lifecycle depend on.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use reqwest::Client;

use super::traits::{CapturedResponse, RequestKey};

/// An outbound request as the interceptor sees it: normalized identity plus
/// the headers and body that ride along untouched.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
  pub key: RequestKey,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl OutboundRequest {
  pub fn new(key: RequestKey) -> Self {
    Self {
      key,
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Attach a JSON body and the matching content type.
  pub fn with_json_body(mut self, body: Vec<u8>) -> Self {
    self.headers.push(("Content-Type".into(), "application/json".into()));
    self.body = Some(body);
    self
  }
}

/// A live fetch against the real network.
///
/// An `Err` from `fetch` means a transport-level failure (connection,
/// resolution, interrupted body). HTTP error statuses come back as
/// `Ok(CapturedResponse)` with that status.
#[async_trait]
pub trait RemoteFetch: Send + Sync {
  async fn fetch(&self, request: &OutboundRequest) -> Result<CapturedResponse>;
}

/// `RemoteFetch` over a reqwest client.
///
/// No request timeout is set here: a hung request is resolved by the
/// underlying network stack or not at all.
pub struct HttpRemote {
  http: Client,
}

impl HttpRemote {
  pub fn new() -> Result<Self> {
    let http = Client::builder()
      .user_agent(concat!("offnote/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { http })
  }
}

#[async_trait]
impl RemoteFetch for HttpRemote {
  async fn fetch(&self, request: &OutboundRequest) -> Result<CapturedResponse> {
    let method = reqwest::Method::from_bytes(request.key.method().as_bytes())
      .map_err(|e| eyre!("Invalid method '{}': {}", request.key.method(), e))?;

    let mut builder = self.http.request(method, request.key.url().clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Network error for {}: {}", request.key, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.to_string(),
          String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body for {}: {}", request.key, e))?
      .to_vec();

    Ok(CapturedResponse {
      status,
      headers,
      body,
      fetched_at: Utc::now(),
    })
  }
}
