//! Data models for the notes API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard response envelope of the notes server.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
  pub success: bool,
  #[serde(default)]
  pub message: Option<String>,
  pub data: Option<T>,
}

/// A note as the server stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
  #[serde(rename = "_id")]
  pub id: String,
  pub title: String,
  pub content: String,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub is_pinned: bool,
  pub updated_at: DateTime<Utc>,
}

/// Fields the client controls when creating or updating a note.
#[derive(Debug, Clone, Serialize)]
pub struct NoteDraft {
  pub title: String,
  pub content: String,
  pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_note_deserializes_server_fields() {
    let json = r#"{
      "_id": "abc123",
      "title": "First",
      "content": "hello",
      "tags": ["work", "ideas"],
      "isPinned": true,
      "updatedAt": "2025-03-01T10:00:00Z"
    }"#;

    let note: Note = serde_json::from_str(json).unwrap();
    assert_eq!(note.id, "abc123");
    assert!(note.is_pinned);
    assert_eq!(note.tags.len(), 2);
  }

  #[test]
  fn test_note_tolerates_missing_optionals() {
    let json = r#"{
      "_id": "abc123",
      "title": "Bare",
      "content": "",
      "updatedAt": "2025-03-01T10:00:00Z"
    }"#;

    let note: Note = serde_json::from_str(json).unwrap();
    assert!(note.tags.is_empty());
    assert!(!note.is_pinned);
  }

  #[test]
  fn test_envelope_with_error_message() {
    let json = r#"{"success": false, "message": "Unauthorized"}"#;
    let envelope: ApiEnvelope<Vec<Note>> = serde_json::from_str(json).unwrap();

    assert!(!envelope.success);
    assert_eq!(envelope.message.as_deref(), Some("Unauthorized"));
    assert!(envelope.data.is_none());
  }
}
