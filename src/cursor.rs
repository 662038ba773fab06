//! Event cursor: the server-assigned position marker attached to every
//! inbound event (the SSE `id:` field).
//!
//! The client never interprets the token. It is stored exactly as received
//! and sent back on reconnect so the server can replay missed events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, server-ordered position in the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCursor(String);

impl EventCursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Parse a cursor from a raw `id:` field. Blank ids carry no position.
    pub fn from_field(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EventCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EventCursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EventCursor {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for EventCursor {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_field_trims_and_rejects_blank() {
        assert_eq!(EventCursor::from_field(" 42 "), Some(EventCursor::new("42")));
        assert!(EventCursor::from_field("").is_none());
        assert!(EventCursor::from_field("   ").is_none());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let cursor = EventCursor::new("1700000000000000001");
        let json = serde_json::to_string(&cursor).unwrap();
        assert_eq!(json, "\"1700000000000000001\"");
        let back: EventCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cursor);
    }
}
