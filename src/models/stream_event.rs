use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::cursor::EventCursor;

/// A decoded application event, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Declared event type (the frame's `event:` field).
    pub event_type: String,
    /// Cursor of the frame, if the server attached one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<EventCursor>,
    /// Innermost payload after decompression and envelope unwrapping.
    pub data: JsonValue,
}

impl StreamEvent {
    pub fn new(event_type: impl Into<String>, cursor: Option<EventCursor>, data: JsonValue) -> Self {
        Self {
            event_type: event_type.into(),
            cursor,
            data,
        }
    }
}

/// Payload of the `connected` handshake event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedInfo {
    /// Session identity issued by the server.
    pub connection_id: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Server time (seconds since Unix epoch).
    #[serde(default)]
    pub timestamp: Option<i64>,
}
