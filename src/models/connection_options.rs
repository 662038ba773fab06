use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection-level options for the event stream client.
///
/// Governs whether a dropped stream is reopened, how long to wait between
/// attempts, and how payloads without a `compressed:` field are treated.
///
/// # Example
///
/// ```rust
/// use skyclust_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Reopen the stream after it drops. Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Base delay in milliseconds for exponential backoff
    /// Default: 1000
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Cap on any single backoff delay, jitter included. Default: 30000
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum number of consecutive reconnection attempts before giving up
    /// Default: Some(10). None means unlimited, Some(0) disables reconnection
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: Option<u32>,

    /// Upper bound (exclusive) of the random jitter added to backoff delays
    /// Default: 1000ms
    #[serde(default = "default_backoff_jitter_ms")]
    pub backoff_jitter_ms: u64,

    /// Upper bound (exclusive) of the random jitter added to a server-advised
    /// `retry:` interval
    /// Default: 500ms
    #[serde(default = "default_server_retry_jitter_ms")]
    pub server_retry_jitter_ms: u64,

    /// Guess compression for payloads that carry no `compressed:` field.
    ///
    /// The guess (long, base64 alphabet, length multiple of 4) can misfire on
    /// plain base64-looking strings; a fallback plain parse covers that.
    /// Default: true
    #[serde(default = "default_compression_heuristic")]
    pub compression_heuristic: bool,

    /// Capacity of the multiplexed event channel
    /// Default: 8192
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

fn default_max_reconnect_attempts() -> Option<u32> {
    Some(10)
}

fn default_backoff_jitter_ms() -> u64 {
    1000
}

fn default_server_retry_jitter_ms() -> u64 {
    500
}

fn default_compression_heuristic() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    8192
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            backoff_jitter_ms: default_backoff_jitter_ms(),
            server_retry_jitter_ms: default_server_retry_jitter_ms(),
            compression_heuristic: default_compression_heuristic(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the base backoff delay (in milliseconds)
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Cap for the backoff delay, in milliseconds.
    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// `None` retries forever; `Some(0)` never reconnects.
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    pub fn with_backoff_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.backoff_jitter_ms = jitter_ms;
        self
    }

    pub fn with_server_retry_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.server_retry_jitter_ms = jitter_ms;
        self
    }

    pub fn with_compression_heuristic(mut self, enabled: bool) -> Self {
        self.compression_heuristic = enabled;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }
}
