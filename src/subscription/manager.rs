//! `SubscriptionManager` – deduplicated, reference-counted subscriptions over
//! one [`Transport`].
//!
//! Many independent callers can ask for the same `(event_type, filter)`
//! pair; the server sees exactly one subscription per
//! [`SubscriptionKey`](crate::subscription::SubscriptionKey). The server
//! unsubscribe is issued when the last holder lets go.
//!
//! All table mutations happen under one async mutex, held across RPCs, so
//! subscribe, unsubscribe, sync and re-issue are totally ordered.
//!
//! # Examples
//!
//! ```rust,no_run
//! use skyclust_link::{SubscriptionFilter, SubscriptionManager};
//!
//! # async fn example(manager: SubscriptionManager) -> skyclust_link::Result<()> {
//! let filter = SubscriptionFilter::new().with_providers(["aws"]);
//! let outcome = manager
//!     .subscribe(&["vm-status", "vm-error"], Some(filter), Some("vm-panel".into()))
//!     .await?;
//! assert!(outcome.is_complete());
//!
//! manager.unsubscribe("vm-panel").await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::connection::{ConnectionState, Transport};
use crate::error::{LinkError, Result};
use crate::models::{SessionIdentity, SubscriptionRequest, SubscriptionStatus};
use crate::subscription::filter::{SubscriptionFilter, SubscriptionKey};
use crate::subscription::table::{Release, SubscriptionTable};

/// System event types that sync never removes.
pub const DEFAULT_PINNED_EVENT_TYPES: &[&str] = &["system-notification", "system-alert"];

/// Subscriber id under which [`SubscriptionManager::sync_subscriptions`]
/// holds its keys.
pub const SYNC_SUBSCRIBER_ID: &str = "__sync__";

/// Per-type result of [`SubscriptionManager::subscribe`].
#[derive(Debug, Clone, Default)]
pub struct SubscribeOutcome {
    pub subscriber_id: String,
    /// Event types this call added to the subscriber.
    pub subscribed: Vec<String>,
    /// Event types the subscriber already held (no change).
    pub already_subscribed: Vec<String>,
    pub failed: Vec<(String, LinkError)>,
}

impl SubscribeOutcome {
    fn new(subscriber_id: &str) -> Self {
        Self {
            subscriber_id: subscriber_id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of [`SubscriptionManager::unsubscribe`].
#[derive(Debug, Clone, Default)]
pub struct UnsubscribeOutcome {
    pub subscriber_id: String,
    /// Keys still held by other subscribers.
    pub released: Vec<String>,
    /// Keys whose last reference went away and were removed.
    pub removed: Vec<String>,
    /// Keys whose server unsubscribe failed; retried by the next sync.
    pub pending: Vec<(String, LinkError)>,
}

/// Result of [`SubscriptionManager::sync_subscriptions`].
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    /// Pinned types held but not desired; kept.
    pub kept_pinned: Vec<String>,
    pub failed: Vec<(String, LinkError)>,
}

/// Result of [`SubscriptionManager::resubscribe_all`].
#[derive(Debug, Clone, Default)]
pub struct ResubscribeReport {
    pub reissued: Vec<String>,
    pub failed: Vec<(String, LinkError)>,
}

enum Removal {
    Removed,
    Pending(LinkError),
}

/// Deduplicating subscription front end. Cheap to clone.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    transport: Transport,
    table: Mutex<SubscriptionTable>,
    pinned: BTreeSet<String>,
    session_wait_timeout: Duration,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("pinned", &self.inner.pinned)
            .field("session_wait_timeout", &self.inner.session_wait_timeout)
            .finish()
    }
}

fn normalize_event_types<S: AsRef<str>>(event_types: &[S]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    event_types
        .iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn normalize_filter(filter: Option<SubscriptionFilter>) -> Option<SubscriptionFilter> {
    filter.filter(|f| !f.is_empty())
}

impl SubscriptionManager {
    pub fn new<I, S>(transport: Transport, session_wait_timeout: Duration, pinned: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                table: Mutex::new(SubscriptionTable::new()),
                pinned: pinned.into_iter().map(Into::into).collect(),
                session_wait_timeout,
            }),
        }
    }

    /// Manager with the default pinned system event types.
    pub fn with_defaults(transport: Transport, session_wait_timeout: Duration) -> Self {
        Self::new(
            transport,
            session_wait_timeout,
            DEFAULT_PINNED_EVENT_TYPES.iter().copied(),
        )
    }

    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    pub fn is_pinned(&self, event_type: &str) -> bool {
        self.inner.pinned.contains(event_type)
    }

    /// Subscribe `subscriber_id` (generated when `None`) to each event type
    /// under `filter`.
    ///
    /// Types are handled independently: a key already in the table only gains
    /// a reference, a new key is registered on the server first. Failures are
    /// reported per type in the outcome.
    pub async fn subscribe<S: AsRef<str>>(
        &self,
        event_types: &[S],
        filter: Option<SubscriptionFilter>,
        subscriber_id: Option<String>,
    ) -> Result<SubscribeOutcome> {
        let event_types = normalize_event_types(event_types);
        if event_types.is_empty() {
            return Err(LinkError::ConfigurationError(
                "subscribe requires at least one event type".to_string(),
            ));
        }
        let subscriber_id = subscriber_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let filter = normalize_filter(filter);

        let mut table = self.inner.table.lock().await;
        Ok(self
            .subscribe_locked(&mut table, &subscriber_id, &event_types, filter.as_ref())
            .await)
    }

    async fn subscribe_locked(
        &self,
        table: &mut SubscriptionTable,
        subscriber_id: &str,
        event_types: &[String],
        filter: Option<&SubscriptionFilter>,
    ) -> SubscribeOutcome {
        let mut outcome = SubscribeOutcome::new(subscriber_id);
        let mut session_ready: Option<Result<SessionIdentity>> = None;

        for event_type in event_types {
            let key = SubscriptionKey::new(event_type, filter);
            if table.holds(subscriber_id, &key) {
                outcome.already_subscribed.push(event_type.clone());
                continue;
            }
            if table.contains(&key) {
                table.add_ref(subscriber_id, &key, event_type, filter);
                log::debug!(
                    "[skyclust-link] '{}' shares existing subscription {}",
                    subscriber_id,
                    key
                );
                outcome.subscribed.push(event_type.clone());
                continue;
            }

            if session_ready.is_none() {
                session_ready = Some(self.await_session().await);
            }
            if let Some(Err(e)) = &session_ready {
                outcome.failed.push((event_type.clone(), e.clone()));
                continue;
            }

            let request = SubscriptionRequest::new(event_type.clone(), filter);
            match self.inner.transport.subscribe_rpc(&request).await {
                Ok(session) => {
                    log::info!(
                        "[skyclust-link] Subscribed {} on session {}",
                        key,
                        session.id
                    );
                    table.insert(subscriber_id, key, event_type, filter, session);
                    outcome.subscribed.push(event_type.clone());
                },
                Err(e) => {
                    log::warn!("[skyclust-link] Subscribe {} failed: {}", key, e);
                    outcome
                        .failed
                        .push((event_type.clone(), LinkError::subscription(event_type, e.to_string())));
                },
            }
        }
        outcome
    }

    /// Release every key `subscriber_id` holds. Unknown ids are a no-op.
    pub async fn unsubscribe(&self, subscriber_id: &str) -> Result<UnsubscribeOutcome> {
        let mut table = self.inner.table.lock().await;
        Ok(self.unsubscribe_locked(&mut table, subscriber_id).await)
    }

    async fn unsubscribe_locked(
        &self,
        table: &mut SubscriptionTable,
        subscriber_id: &str,
    ) -> UnsubscribeOutcome {
        let mut outcome = UnsubscribeOutcome {
            subscriber_id: subscriber_id.to_string(),
            ..Default::default()
        };
        let keys: Vec<SubscriptionKey> = match table.subscriber(subscriber_id) {
            Some(record) => record.keys.iter().cloned().collect(),
            None => {
                log::debug!("[skyclust-link] unsubscribe: unknown subscriber '{}'", subscriber_id);
                return outcome;
            },
        };

        for key in keys {
            match table.release(subscriber_id, &key) {
                Release::Shared(_) => outcome.released.push(key.to_string()),
                Release::Last => match self.remove_on_server(table, &key).await {
                    Removal::Removed => outcome.removed.push(key.to_string()),
                    Removal::Pending(e) => outcome.pending.push((key.to_string(), e)),
                },
                Release::NotHeld => {},
            }
        }
        outcome
    }

    /// Issue the server unsubscribe for a zero-reference entry and drop it.
    ///
    /// Entries registered on an earlier session are dropped locally; the
    /// server-side subscription ended with that session.
    async fn remove_on_server(&self, table: &mut SubscriptionTable, key: &SubscriptionKey) -> Removal {
        let Some(entry) = table.entry(key) else {
            return Removal::Removed;
        };
        let current = self.inner.transport.session();
        if !entry.is_registered_on(current.as_ref()) {
            log::debug!("[skyclust-link] Dropping {} locally (session gone)", key);
            table.remove_entry(key);
            return Removal::Removed;
        }

        let request = entry.request();
        match self.inner.transport.unsubscribe_rpc(&request).await {
            Ok(_) | Err(LinkError::SessionChanged) | Err(LinkError::NotConnected(_)) => {
                log::info!("[skyclust-link] Unsubscribed {}", key);
                table.remove_entry(key);
                Removal::Removed
            },
            Err(e) => {
                log::warn!(
                    "[skyclust-link] Unsubscribe {} failed, keeping for retry: {}",
                    key,
                    e
                );
                Removal::Pending(LinkError::subscription(&request.event_type, e.to_string()))
            },
        }
    }

    /// Converge the sync-held subscriptions onto `desired` under `filter`.
    ///
    /// Requires an open stream; otherwise fails with
    /// [`LinkError::NotConnected`] and changes nothing. Pinned types are
    /// never removed. Entries whose earlier server unsubscribe failed are
    /// retried first.
    pub async fn sync_subscriptions<S: AsRef<str>>(
        &self,
        desired: &[S],
        filter: Option<SubscriptionFilter>,
    ) -> Result<SyncOutcome> {
        let transport = &self.inner.transport;
        if transport.state() != ConnectionState::Open || transport.session().is_none() {
            return Err(LinkError::NotConnected(format!(
                "Cannot sync subscriptions while {}",
                transport.state()
            )));
        }

        let desired_types = normalize_event_types(desired);
        let filter = normalize_filter(filter);
        let mut table = self.inner.table.lock().await;
        let mut outcome = SyncOutcome::default();

        for key in table.pending_removals() {
            if let Removal::Pending(e) = self.remove_on_server(&mut table, &key).await {
                outcome.failed.push((key.to_string(), e));
            }
        }

        let desired_keys: BTreeSet<SubscriptionKey> = desired_types
            .iter()
            .map(|t| SubscriptionKey::new(t, filter.as_ref()))
            .collect();
        let held: Vec<(SubscriptionKey, String)> = match table.subscriber(SYNC_SUBSCRIBER_ID) {
            Some(record) => record
                .keys
                .iter()
                .filter_map(|k| table.entry(k).map(|e| (k.clone(), e.event_type.clone())))
                .collect(),
            None => Vec::new(),
        };

        for (key, event_type) in &held {
            if desired_keys.contains(key) {
                outcome.unchanged.push(event_type.clone());
                continue;
            }
            if self.is_pinned(event_type) {
                outcome.kept_pinned.push(event_type.clone());
                continue;
            }
            match table.release(SYNC_SUBSCRIBER_ID, key) {
                Release::Last => match self.remove_on_server(&mut table, key).await {
                    Removal::Removed => outcome.removed.push(event_type.clone()),
                    Removal::Pending(e) => outcome.failed.push((event_type.clone(), e)),
                },
                Release::Shared(_) => outcome.removed.push(event_type.clone()),
                Release::NotHeld => {},
            }
        }

        let to_add: Vec<String> = desired_types
            .into_iter()
            .filter(|t| !table.holds(SYNC_SUBSCRIBER_ID, &SubscriptionKey::new(t, filter.as_ref())))
            .collect();
        if !to_add.is_empty() {
            let added = self
                .subscribe_locked(&mut table, SYNC_SUBSCRIBER_ID, &to_add, filter.as_ref())
                .await;
            outcome.added.extend(added.subscribed);
            outcome.failed.extend(added.failed);
        }

        log::debug!(
            "[skyclust-link] Sync: +{} -{} ={} pinned={} failed={}",
            outcome.added.len(),
            outcome.removed.len(),
            outcome.unchanged.len(),
            outcome.kept_pinned.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    /// Replace everything `subscriber_id` holds: unsubscribe, then subscribe
    /// under the same id.
    pub async fn update_subscription<S: AsRef<str>>(
        &self,
        subscriber_id: &str,
        event_types: &[S],
        filter: Option<SubscriptionFilter>,
    ) -> Result<SubscribeOutcome> {
        let event_types = normalize_event_types(event_types);
        if event_types.is_empty() {
            return Err(LinkError::ConfigurationError(
                "update_subscription requires at least one event type".to_string(),
            ));
        }
        let filter = normalize_filter(filter);

        let mut table = self.inner.table.lock().await;
        let released = self.unsubscribe_locked(&mut table, subscriber_id).await;
        if !released.pending.is_empty() {
            log::warn!(
                "[skyclust-link] update '{}': {} server unsubscribe(s) pending",
                subscriber_id,
                released.pending.len()
            );
        }
        Ok(self
            .subscribe_locked(&mut table, subscriber_id, &event_types, filter.as_ref())
            .await)
    }

    /// Snapshot of the connection and every table entry.
    pub async fn get_subscription_status(&self) -> SubscriptionStatus {
        let table = self.inner.table.lock().await;
        let status = self.inner.transport.status();
        SubscriptionStatus {
            connection_state: status.state,
            session_id: status.session.map(|s| s.id),
            entries: table.snapshot(),
            subscriber_count: table.subscriber_count(),
        }
    }

    /// Re-register every live entry that is not on `session`.
    ///
    /// Zero-reference entries left from a failed unsubscribe are dropped; the
    /// old session took their server-side subscription with it.
    pub async fn resubscribe_all(&self, session: &SessionIdentity) -> ResubscribeReport {
        let mut table = self.inner.table.lock().await;
        let mut report = ResubscribeReport::default();

        for key in table.pending_removals() {
            if !table.entry(&key).is_some_and(|e| e.is_registered_on(Some(session))) {
                table.remove_entry(&key);
            }
        }

        for key in table.stale_entries(session) {
            let Some(request) = table.entry(&key).map(|e| e.request()) else {
                continue;
            };
            match self.inner.transport.subscribe_rpc(&request).await {
                Ok(registered) => {
                    table.set_session(&key, registered);
                    report.reissued.push(key.to_string());
                },
                Err(e) => {
                    log::warn!("[skyclust-link] Re-subscribe {} failed: {}", key, e);
                    report.failed.push((key.to_string(), e));
                },
            }
        }

        if !report.reissued.is_empty() || !report.failed.is_empty() {
            log::info!(
                "[skyclust-link] Re-issued {} subscription(s) on session {} ({} failed)",
                report.reissued.len(),
                session.id,
                report.failed.len()
            );
        }
        report
    }

    /// Spawn a task that calls [`resubscribe_all`](Self::resubscribe_all)
    /// whenever the transport reports a new session.
    ///
    /// The task holds the manager weakly and ends when the manager is dropped
    /// or the transport shuts down.
    pub fn spawn_session_watcher(&self) -> JoinHandle<()> {
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let mut rx = self.inner.transport.session_watch();
        tokio::spawn(async move {
            let mut last: Option<SessionIdentity> = None;
            loop {
                let session = rx.borrow_and_update().session.clone();
                if let Some(current) = session.as_ref().filter(|s| Some(*s) != last.as_ref()) {
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    let manager = SubscriptionManager { inner };
                    manager.resubscribe_all(current).await;
                }
                last = session;

                if rx.changed().await.is_err() {
                    break;
                }
            }
            log::debug!("[skyclust-link] Session watcher exiting");
        })
    }

    /// Wait (bounded) for the transport to issue a session.
    async fn await_session(&self) -> Result<SessionIdentity> {
        let transport = &self.inner.transport;
        if let Some(session) = transport.session() {
            return Ok(session);
        }
        if transport.state() == ConnectionState::Disconnected {
            return Err(LinkError::NotConnected(
                "Transport is disconnected; call connect first".to_string(),
            ));
        }
        transport.wait_for_session(self.inner.session_wait_timeout).await
    }
}
