//! =============================================================================
//! Shared Wire Types
//! =============================================================================
//!
//! Envelope structs for the backend's seq/command protocol.  Keeping them in
//! one module lets the RPC layer and the protocol handlers share the wire
//! shapes without a web of circular dependencies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound backend request.  The sequence number is assigned by the RPC
/// layer at dispatch time so callers never pick their own.
#[derive(Debug, Serialize)]
pub struct BackendRequest<'a> {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub command: &'a str,
    pub arguments: Value,
}

impl<'a> BackendRequest<'a> {
    pub fn new(seq: u64, command: &'a str, arguments: Value) -> Self {
        Self {
            seq,
            kind: "request",
            command,
            arguments,
        }
    }
}

/// The routing-relevant head of any inbound backend message.  Responses carry
/// `request_seq` and `success`; events and everything else are identified by
/// `kind` alone and skipped by the correlation table.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendResponseHead {
    #[serde(rename = "type")]
    pub kind: String,
    pub request_seq: Option<u64>,
    pub success: Option<bool>,
    pub message: Option<String>,
}

impl BackendResponseHead {
    pub fn parse(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }

    pub fn is_response(&self) -> bool {
        self.kind == "response"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_serializes_with_type_tag() {
        let request = BackendRequest::new(7, "linkedEditingRange", json!({"file": "/tmp/a.html"}));
        let value = serde_json::to_value(&request).expect("envelope serializes");
        assert_eq!(
            value,
            json!({
                "seq": 7,
                "type": "request",
                "command": "linkedEditingRange",
                "arguments": {"file": "/tmp/a.html"},
            })
        );
    }

    #[test]
    fn response_head_parses_responses_and_events() {
        let response = json!({
            "type": "response",
            "request_seq": 3,
            "success": true,
            "body": {}
        });
        let head = BackendResponseHead::parse(&response).expect("head parses");
        assert!(head.is_response());
        assert_eq!(head.request_seq, Some(3));
        assert_eq!(head.success, Some(true));

        let event = json!({"type": "event", "event": "projectLoadingFinish"});
        let head = BackendResponseHead::parse(&event).expect("event head parses");
        assert!(!head.is_response());
        assert_eq!(head.request_seq, None);
    }
}
