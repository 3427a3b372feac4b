//! Typed boundary to the notes server.
//!
//! Everything here goes through the cache interceptor, so listings keep
//! working offline while mutations always require the live server.

mod client;
mod types;

pub use client::{NoteListing, NotesClient};
pub use types::{ApiEnvelope, Note, NoteDraft};
