use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::SessionIdentity;

/// Lifecycle of the single event stream.
///
/// ```text
/// Disconnected → Connecting → Open → {Erroring, Closing} → Reconnecting → Connecting …
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// The stream failed; teardown is in progress.
    Erroring,
    /// The server ended the stream cleanly; teardown is in progress.
    Closing,
    /// Waiting for the reconnect timer.
    Reconnecting,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }

    /// Whether an attempt to (re)establish the stream is underway or scheduled.
    pub fn is_transitioning(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Erroring => "erroring",
            ConnectionState::Closing => "closing",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published by the control task through a `watch` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStatus {
    pub state: ConnectionState,
    /// Present only while the stream is open and the server has issued one.
    pub session: Option<SessionIdentity>,
    /// Connect generation; bumped on every connect attempt and disconnect.
    pub generation: u64,
    /// Consecutive failed reconnect attempts since the last `Open`.
    pub reconnect_attempts: u32,
}

impl Default for TransportStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            session: None,
            generation: 0,
            reconnect_attempts: 0,
        }
    }
}
