//! Timeout configuration for skyclust-link operations.
//!
//! Centralizes the timeouts for opening the stream, waiting for the session
//! handshake, subscription RPCs and stream liveness.

use std::time::Duration;

/// Timeout configuration for skyclust-link operations.
///
/// # Examples
///
/// ```rust
/// use skyclust_link::LinkTimeouts;
/// use std::time::Duration;
///
/// // 10s open/session/RPC, 90s idle
/// let timeouts = LinkTimeouts::default();
///
/// // Slow links: longer open, longer liveness window
/// let timeouts = LinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(30))
///     .idle_timeout(Duration::from_secs(180))
///     .build();
///
/// // Short everything, for tests and localhost
/// let timeouts = LinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTimeouts {
    /// Timeout for opening the event stream (TCP + TLS + response headers).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// How long a subscription operation waits for the server to issue a
    /// session before failing that call.
    /// Default: 10 seconds
    pub session_wait_timeout: Duration,

    /// Timeout for one subscribe/unsubscribe RPC.
    /// Default: 10 seconds
    pub rpc_timeout: Duration,

    /// Stream liveness window. The server sends a heartbeat comment every
    /// 30 seconds; if no bytes at all arrive for this long the connection is
    /// treated as dead and the reconnect policy applies.
    /// Set to 0 to disable.
    /// Default: 90 seconds
    pub idle_timeout: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            session_wait_timeout: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(90),
        }
    }
}

impl LinkTimeouts {
    pub fn builder() -> LinkTimeoutsBuilder {
        LinkTimeoutsBuilder::new()
    }

    /// Two-second operation timeouts and a 35s liveness window.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            session_wait_timeout: Duration::from_secs(2),
            rpc_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(35),
        }
    }

    /// Thirty-second operation timeouts and a 180s liveness window.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            session_wait_timeout: Duration::from_secs(30),
            rpc_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(180),
        }
    }

    /// Zero means the timeout is disabled.
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero()
    }
}

/// Builder for [`LinkTimeouts`].
#[derive(Debug, Clone, Default)]
pub struct LinkTimeoutsBuilder {
    timeouts: LinkTimeouts,
}

impl LinkTimeoutsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `base` instead of the defaults.
    pub fn from_base(mut self, base: LinkTimeouts) -> Self {
        self.timeouts = base;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    pub fn session_wait_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.session_wait_timeout = timeout;
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.rpc_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.idle_timeout = timeout;
        self
    }

    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    pub fn idle_timeout_secs(self, secs: u64) -> Self {
        self.idle_timeout(Duration::from_secs(secs))
    }

    pub fn build(self) -> LinkTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = LinkTimeouts::default();
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.session_wait_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.idle_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_builder_overrides() {
        let timeouts = LinkTimeouts::builder()
            .connection_timeout_secs(3)
            .rpc_timeout(Duration::from_millis(500))
            .idle_timeout(Duration::ZERO)
            .build();
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(3));
        assert_eq!(timeouts.rpc_timeout, Duration::from_millis(500));
        assert!(LinkTimeouts::is_no_timeout(timeouts.idle_timeout));
        assert_eq!(timeouts.session_wait_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_fast_idle_outlasts_heartbeat() {
        assert!(LinkTimeouts::fast().idle_timeout > Duration::from_secs(30));
    }
}
