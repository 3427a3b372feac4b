//! Notes API client that routes every request through the cache
//! interceptor.
//!
//! Note listings are API reads and therefore survive going offline; every
//! mutation passes through to the live server untouched.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;

use crate::cache::{
  CapturedResponse, FetchInterceptor, OutboundRequest, RemoteFetch, RequestKey, ResponseSource,
  StoreProvider,
};

use super::types::{ApiEnvelope, Note, NoteDraft};

/// A page of notes plus where it came from, so the shell can tell the user
/// when it is looking at an offline snapshot.
#[derive(Debug, Clone)]
pub struct NoteListing {
  pub notes: Vec<Note>,
  pub source: ResponseSource,
  pub fetched_at: DateTime<Utc>,
}

/// Typed client for the notes server.
pub struct NotesClient<P, N> {
  interceptor: FetchInterceptor<P, N>,
  token: Option<String>,
}

impl<P, N> NotesClient<P, N>
where
  P: StoreProvider + 'static,
  N: RemoteFetch,
{
  pub fn new(interceptor: FetchInterceptor<P, N>, token: Option<String>) -> Self {
    Self { interceptor, token }
  }

  /// List notes, optionally filtered by a search term.
  pub async fn list_notes(&self, search: Option<&str>) -> Result<NoteListing> {
    let policy = self.interceptor.policy();
    let mut url = policy
      .origin
      .join(&self.notes_path(""))
      .map_err(|e| eyre!("Invalid notes path: {}", e))?;
    if let Some(term) = search {
      url.query_pairs_mut().append_pair("search", term);
    }

    let request = self.authorized(OutboundRequest::new(RequestKey::new("GET", url)));
    let result = self.interceptor.execute(request).await?;
    let notes: Vec<Note> = parse_envelope(&result.response)?;

    Ok(NoteListing {
      notes,
      source: result.source,
      fetched_at: result.response.fetched_at,
    })
  }

  pub async fn create_note(&self, draft: &NoteDraft) -> Result<Note> {
    let request = self
      .request("POST", &self.notes_path(""))?
      .with_json_body(serde_json::to_vec(draft)?);

    let result = self.interceptor.execute(request).await?;
    parse_envelope(&result.response)
  }

  pub async fn update_note(&self, id: &str, draft: &NoteDraft) -> Result<Note> {
    let request = self
      .request("PUT", &self.notes_path(&format!("/{}", id)))?
      .with_json_body(serde_json::to_vec(draft)?);

    let result = self.interceptor.execute(request).await?;
    parse_envelope(&result.response)
  }

  pub async fn toggle_pin(&self, id: &str) -> Result<()> {
    let request = self.request("PATCH", &self.notes_path(&format!("/{}/pin", id)))?;
    let result = self.interceptor.execute(request).await?;
    let _: serde_json::Value = parse_envelope(&result.response)?;
    Ok(())
  }

  pub async fn delete_note(&self, id: &str) -> Result<()> {
    let request = self.request("DELETE", &self.notes_path(&format!("/{}", id)))?;
    let result = self.interceptor.execute(request).await?;
    let _: serde_json::Value = parse_envelope(&result.response)?;
    Ok(())
  }

  fn notes_path(&self, suffix: &str) -> String {
    let prefix = self.interceptor.policy().api_prefix.trim_end_matches('/');
    format!("{}/notes{}", prefix, suffix)
  }

  fn request(&self, method: &str, target: &str) -> Result<OutboundRequest> {
    let policy = self.interceptor.policy();
    let key = RequestKey::resolve(method, &policy.origin, target)?;
    Ok(self.authorized(OutboundRequest::new(key)))
  }

  fn authorized(&self, request: OutboundRequest) -> OutboundRequest {
    match &self.token {
      Some(token) => request.with_header("Authorization", format!("Bearer {}", token)),
      None => request,
    }
  }
}

/// Unwrap the server's `{success, message, data}` envelope or surface its
/// error message.
fn parse_envelope<T: DeserializeOwned>(response: &CapturedResponse) -> Result<T> {
  if !response.is_success() {
    let message = serde_json::from_slice::<ApiEnvelope<serde_json::Value>>(&response.body)
      .ok()
      .and_then(|envelope| envelope.message)
      .unwrap_or_else(|| format!("HTTP {}", response.status));
    return Err(eyre!("Notes API error: {}", message));
  }

  let envelope: ApiEnvelope<T> = serde_json::from_slice(&response.body)
    .map_err(|e| eyre!("Failed to parse notes API response: {}", e))?;

  if !envelope.success {
    return Err(eyre!(
      "Notes API error: {}",
      envelope.message.unwrap_or_else(|| "unknown".to_string())
    ));
  }

  envelope
    .data
    .ok_or_else(|| eyre!("Notes API response carried no data"))
}
