//! Error types for skyclust-link.

use thiserror::Error;

/// Errors that can occur while streaming or managing subscriptions.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    /// Transport-level network failure (connection refused, reset, DNS).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Credentials were rejected, or the stream failed before a session was issued.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The event stream ended or produced an unreadable chunk.
    #[error("Stream error: {0}")]
    StreamError(String),

    /// A single frame could not be decoded, even by the fallback parse.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Non-2xx response from the server.
    #[error("Server error {status_code}: {message}")]
    ServerError { status_code: u16, message: String },

    /// Subscribe or unsubscribe RPC failure for one event type.
    #[error("Subscription error for '{event_type}': {message}")]
    SubscriptionError { event_type: String, message: String },

    /// No session is available (stream not open, or session not yet issued).
    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("A connect attempt is already in flight")]
    ConnectInFlight,

    /// The session an operation was issued against ended before it completed.
    #[error("Session changed while request was in flight")]
    SessionChanged,

    /// Reconnect attempt budget exhausted; no further attempts until `connect`.
    #[error("Max reconnection attempts ({0}) reached")]
    ReconnectExhausted(u32),

    #[error("Cursor store error: {0}")]
    CursorStoreError(String),

    /// The transport control task is no longer running.
    #[error("Transport closed")]
    Closed,
}

impl LinkError {
    pub(crate) fn subscription(event_type: &str, message: impl Into<String>) -> Self {
        LinkError::SubscriptionError {
            event_type: event_type.to_string(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for LinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LinkError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            LinkError::SerializationError(err.to_string())
        } else {
            LinkError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::CursorStoreError(err.to_string())
    }
}

impl From<toml::de::Error> for LinkError {
    fn from(err: toml::de::Error) -> Self {
        LinkError::ConfigurationError(err.to_string())
    }
}

/// Result type for skyclust-link operations.
pub type Result<T> = std::result::Result<T, LinkError>;
