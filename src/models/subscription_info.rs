//! Subscription metadata exposed to callers.
//!
//! [`SubscriptionInfo`] and [`SubscriptionStatus`] are read-only snapshots of
//! the subscription table, so callers can detect drift between what they
//! asked for and what is registered on the server.

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;
use crate::subscription::filter::SubscriptionFilter;

/// Snapshot of one deduplicated subscription entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Canonical subscription key.
    pub key: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<SubscriptionFilter>,
    /// Number of subscribers holding this entry.
    pub ref_count: u32,
    pub subscribers: Vec<String>,
    /// Millis since Unix epoch when the entry was created.
    pub created_at_ms: u64,
    /// Session the server-side subscription is registered on, if any.
    pub session_id: Option<String>,
    /// Zero subscribers, but the server unsubscribe has not succeeded yet.
    pub pending_removal: bool,
}

/// Snapshot of the whole subscription manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    pub connection_state: ConnectionState,
    pub session_id: Option<String>,
    pub entries: Vec<SubscriptionInfo>,
    pub subscriber_count: usize,
}

impl SubscriptionStatus {
    /// Entries that are not registered on the current session.
    pub fn unsynced(&self) -> impl Iterator<Item = &SubscriptionInfo> {
        self.entries
            .iter()
            .filter(move |e| e.session_id.is_none() || e.session_id != self.session_id)
    }

    pub fn entry(&self, key: &str) -> Option<&SubscriptionInfo> {
        self.entries.iter().find(|e| e.key == key)
    }
}
