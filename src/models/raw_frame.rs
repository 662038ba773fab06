use serde::{Deserialize, Serialize};

use crate::cursor::EventCursor;

/// Event name the server uses for the session handshake.
pub const CONNECTED_EVENT: &str = "connected";

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One undecoded frame from the event stream.
///
/// Mirrors the server-sent-events block layout:
///
/// ```text
/// id: 1700000000000000001
/// event: vm-status
/// compressed: true
/// data: H4sIAAAA...
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    /// `id:` field (the event cursor), if the frame carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `event:` field, `"message"` when absent.
    pub event: String,
    /// `data:` lines joined with `\n`.
    #[serde(default)]
    pub data: String,
    /// Explicit compression flag, when the server sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed: Option<bool>,
    /// Server-advised reconnect interval (`retry:` field) in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_ms: Option<u64>,
}

impl RawFrame {
    /// Data frame with the given event name and payload.
    pub fn data(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: event.into(),
            data: data.into(),
            compressed: None,
            retry_ms: None,
        }
    }

    /// Frame carrying only a `retry:` advisory.
    pub fn retry(retry_ms: u64) -> Self {
        Self {
            id: None,
            event: DEFAULT_EVENT.to_string(),
            data: String::new(),
            compressed: None,
            retry_ms: Some(retry_ms),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = Some(compressed);
        self
    }

    pub fn with_retry_ms(mut self, retry_ms: u64) -> Self {
        self.retry_ms = Some(retry_ms);
        self
    }

    /// Cursor carried by this frame, if any.
    pub fn cursor(&self) -> Option<EventCursor> {
        self.id.as_deref().and_then(EventCursor::from_field)
    }

    /// Whether this is the session handshake.
    pub fn is_connected_event(&self) -> bool {
        self.event == CONNECTED_EVENT
    }

    /// Whether the frame has a payload to decode.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }
}
