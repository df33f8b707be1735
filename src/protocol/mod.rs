//! =============================================================================
//! Protocol Handlers
//! =============================================================================
//!
//! Every LSP method this server understands maps to a Rust module inside this
//! tree.  Handlers stay free of transport concerns: notification handlers
//! produce the backend payload for the server loop to dispatch, and the
//! linked-editing handler owns the adapter the feature workers invoke.

pub mod text_document;

use serde_json::Value;

/// Backend payload produced by a notification handler.
pub struct NotificationSpec {
    pub command: &'static str,
    pub arguments: Value,
}
