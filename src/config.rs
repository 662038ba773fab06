//! Configuration file support.
//!
//! # File layout
//!
//! ```toml
//! [server]
//! url = "https://api.skyclust.example"   # API base URL
//! token = "eyJhbGc..."                    # optional bearer token
//!
//! [connection]
//! auto_reconnect = true            # Auto-reconnect on connection loss
//! reconnect_delay_ms = 1000        # Backoff base
//! max_reconnect_delay_ms = 30000   # Backoff cap
//! max_reconnect_attempts = 10      # 0 = unlimited
//! compression_heuristic = true     # Guess compression when unflagged
//!
//! [timeouts]
//! profile = "default"              # "fast" | "relaxed"; fields below override it
//! connection_timeout_ms = 10000
//! session_wait_timeout_ms = 10000
//! rpc_timeout_ms = 10000
//! idle_timeout_ms = 90000          # 0 = disabled
//!
//! [cursor]
//! path = "~/.skyclust/stream-state.json"   # omit for in-memory cursor
//! key = "skyclust.sse.last_event_id"
//!
//! [subscriptions]
//! pinned = ["system-notification", "system-alert"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::client::RealtimeClientBuilder;
use crate::cursor_store::{CursorStore, FileCursorStore, MemoryCursorStore, DEFAULT_CURSOR_KEY};
use crate::error::{LinkError, Result};
use crate::models::ConnectionOptions;
use crate::subscription::DEFAULT_PINNED_EVENT_TYPES;
use crate::timeouts::LinkTimeouts;

/// Client configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkConfig {
    pub server: Option<ServerConfig>,
    pub connection: Option<ConnectionConfig>,
    pub timeouts: Option<TimeoutsConfig>,
    pub cursor: Option<CursorConfig>,
    pub subscriptions: Option<SubscriptionsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API base URL (e.g., https://api.skyclust.example)
    pub url: String,

    /// Bearer token used by `connect()`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Reconnection and decoding behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Consecutive failed reopen attempts allowed; 0 means no limit. Default: 10
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_compression_heuristic")]
    pub compression_heuristic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Starting point before the per-field overrides.
    pub profile: Option<String>,
    pub connection_timeout_ms: Option<u64>,
    pub session_wait_timeout_ms: Option<u64>,
    pub rpc_timeout_ms: Option<u64>,
    /// 0 disables the liveness check
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorConfig {
    /// JSON state file; `~/` expands to the home directory
    pub path: Option<PathBuf>,

    #[serde(default = "default_cursor_key")]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionsConfig {
    /// Event types that subscription sync never removes
    #[serde(default = "default_pinned")]
    pub pinned: Vec<String>,
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

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_compression_heuristic() -> bool {
    true
}

fn default_cursor_key() -> String {
    DEFAULT_CURSOR_KEY.to_string()
}

fn default_pinned() -> Vec<String> {
    DEFAULT_PINNED_EVENT_TYPES.iter().map(|s| s.to_string()).collect()
}

pub fn expand_config_path(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

impl LinkConfig {
    /// Load configuration from file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let path = expand_config_path(path);
        if !path.exists() {
            log::debug!("[skyclust-link] No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            LinkError::ConfigurationError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| LinkError::ConfigurationError(format!("Failed to serialize: {}", e)))
    }

    /// Build ConnectionOptions from the `[connection]` section.
    pub fn to_connection_options(&self) -> ConnectionOptions {
        let mut options = ConnectionOptions::default();
        if let Some(ref conn) = self.connection {
            // 0 means unlimited
            let max_attempts = if conn.max_reconnect_attempts == 0 {
                None
            } else {
                Some(conn.max_reconnect_attempts)
            };
            options = options
                .with_auto_reconnect(conn.auto_reconnect)
                .with_reconnect_delay_ms(conn.reconnect_delay_ms)
                .with_max_reconnect_delay_ms(conn.max_reconnect_delay_ms)
                .with_max_reconnect_attempts(max_attempts)
                .with_compression_heuristic(conn.compression_heuristic);
        }
        options
    }

    pub fn to_timeouts(&self) -> LinkTimeouts {
        let base = match self.timeouts.as_ref().and_then(|t| t.profile.as_deref()) {
            Some("fast") => LinkTimeouts::fast(),
            Some("relaxed") => LinkTimeouts::relaxed(),
            None | Some("default") => LinkTimeouts::default(),
            Some(other) => {
                log::warn!("[skyclust-link] Unknown timeouts profile '{}', using defaults", other);
                LinkTimeouts::default()
            },
        };
        let mut builder = LinkTimeouts::builder().from_base(base);
        if let Some(ref t) = self.timeouts {
            if let Some(ms) = t.connection_timeout_ms {
                builder = builder.connection_timeout(Duration::from_millis(ms));
            }
            if let Some(ms) = t.session_wait_timeout_ms {
                builder = builder.session_wait_timeout(Duration::from_millis(ms));
            }
            if let Some(ms) = t.rpc_timeout_ms {
                builder = builder.rpc_timeout(Duration::from_millis(ms));
            }
            if let Some(ms) = t.idle_timeout_ms {
                builder = builder.idle_timeout(Duration::from_millis(ms));
            }
        }
        builder.build()
    }

    /// File-backed store when `[cursor].path` is set, in-memory otherwise.
    pub fn to_cursor_store(&self) -> Arc<dyn CursorStore> {
        match self.cursor.as_ref().and_then(|c| c.path.as_ref().map(|p| (p, &c.key))) {
            Some((path, key)) => Arc::new(FileCursorStore::with_key(expand_config_path(path), key.clone())),
            None => Arc::new(MemoryCursorStore::new()),
        }
    }

    pub fn pinned_event_types(&self) -> Vec<String> {
        self.subscriptions
            .as_ref()
            .map(|s| s.pinned.clone())
            .unwrap_or_else(default_pinned)
    }

    /// Turn this configuration into a client builder.
    pub fn into_builder(self) -> Result<RealtimeClientBuilder> {
        let server = self.server.as_ref().ok_or_else(|| {
            LinkError::ConfigurationError("[server] section with url is required".to_string())
        })?;

        let mut builder = RealtimeClientBuilder::new()
            .base_url(server.url.clone())
            .connection_options(self.to_connection_options())
            .timeouts(self.to_timeouts())
            .cursor_store(self.to_cursor_store())
            .pinned_event_types(self.pinned_event_types());
        if let Some(token) = server.token.clone() {
            builder = builder.token(token);
        }
        Ok(builder)
    }
}
