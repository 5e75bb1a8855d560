//! Bridge frames exchanged with a browser-side shim.
//!
//! The bridge forwards every [`TagCommand`] as one JSON text frame; the shim
//! pushes it onto the tag library's own command queue and reports back only
//! readiness and asynchronous failures.
//!
//! # Format
//!
//! Outbound (Rust → shim):
//!
//! ```json
//! {
//!   "id": "uuid",
//!   "handle": 7,
//!   "method": "googletag.defineSlot",
//!   "params": { ... }
//! }
//! ```
//!
//! Inbound (shim → Rust):
//!
//! ```json
//! { "type": "ready" }
//! { "type": "error", "id": "uuid", "message": "defineSlot returned null" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::{RequestId, SlotHandle};

use super::TagCommand;

// ============================================================================
// Request
// ============================================================================

/// A command frame sent to the shim.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Frame identifier, echoed back on errors.
    pub id: RequestId,

    /// Handle the shim must bind the created slot to (definitions only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<SlotHandle>,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: TagCommand,
}

impl Request {
    /// Creates a frame with a generated id.
    #[inline]
    #[must_use]
    pub fn new(command: TagCommand, handle: Option<SlotHandle>) -> Self {
        Self {
            id: RequestId::generate(),
            handle,
            command,
        }
    }
}

// ============================================================================
// Notice
// ============================================================================

/// A frame received from the shim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Notice {
    /// The tag library's command queue exists.
    Ready,
    /// A previously sent command failed inside the library.
    Error {
        /// Id of the failed frame.
        id: RequestId,
        /// Failure description.
        message: String,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::ContainerId;
    use crate::protocol::DisplayTarget;

    #[test]
    fn test_request_serialization() {
        let command = TagCommand::Display {
            target: DisplayTarget::Container(ContainerId::new("X").unwrap()),
        };
        let request = Request::new(command, None);
        let json = serde_json::to_value(&request).expect("serialize");

        assert_eq!(json["method"], "googletag.display");
        assert_eq!(json["params"]["target"]["container"], "X");
        assert!(json.get("handle").is_none());
        assert!(json["id"].is_string());
    }

    #[test]
    fn test_request_carries_handle() {
        let handle = SlotHandle::from_u64(7).unwrap();
        let request = Request::new(TagCommand::EnableServices, Some(handle));
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["handle"], 7);
    }

    #[test]
    fn test_ready_notice() {
        let notice: Notice = serde_json::from_str(r#"{"type":"ready"}"#).expect("parse");
        assert_eq!(notice, Notice::Ready);
    }

    #[test]
    fn test_error_notice() {
        let json_str = r#"{
            "type": "error",
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "message": "defineSlot returned null"
        }"#;

        let notice: Notice = serde_json::from_str(json_str).expect("parse");
        assert!(matches!(notice, Notice::Error { ref message, .. } if message.contains("null")));
    }

    #[test]
    fn test_unknown_notice_rejected() {
        assert!(serde_json::from_str::<Notice>(r#"{"type":"bogus"}"#).is_err());
    }
}
