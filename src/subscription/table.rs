//! Reference-counted subscription table.
//!
//! Pure bookkeeping with no I/O: the manager decides when RPCs happen and
//! records their outcome here. One entry exists per [`SubscriptionKey`]; its
//! `ref_count` always equals the number of subscribers holding the key.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{SessionIdentity, SubscriptionInfo, SubscriptionRequest};
use crate::subscription::filter::{SubscriptionFilter, SubscriptionKey};

/// Current time in millis since Unix epoch.
#[inline]
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One deduplicated server-side subscription.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionEntry {
    pub key: SubscriptionKey,
    pub event_type: String,
    pub filter: Option<SubscriptionFilter>,
    pub ref_count: u32,
    pub subscribers: BTreeSet<String>,
    pub created_at_ms: u64,
    /// Session the server-side subscription was registered on.
    pub session: Option<SessionIdentity>,
}

impl SubscriptionEntry {
    pub fn request(&self) -> SubscriptionRequest {
        SubscriptionRequest::new(self.event_type.clone(), self.filter.as_ref())
    }

    pub fn is_pending_removal(&self) -> bool {
        self.ref_count == 0
    }

    pub fn is_registered_on(&self, session: Option<&SessionIdentity>) -> bool {
        session.is_some() && self.session.as_ref() == session
    }

    fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            key: self.key.to_string(),
            event_type: self.event_type.clone(),
            filter: self.filter.clone(),
            ref_count: self.ref_count,
            subscribers: self.subscribers.iter().cloned().collect(),
            created_at_ms: self.created_at_ms,
            session_id: self.session.as_ref().map(|s| s.id.clone()),
            pending_removal: self.is_pending_removal(),
        }
    }
}

/// What one logical caller holds.
#[derive(Debug, Clone, Default)]
pub(crate) struct SubscriberRecord {
    pub subscriber_id: String,
    pub event_types: BTreeSet<String>,
    /// Filter of the most recent subscribe call.
    pub filter: Option<SubscriptionFilter>,
    pub keys: BTreeSet<SubscriptionKey>,
}

/// Result of dropping one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// Other subscribers still hold the key.
    Shared(u32),
    /// That was the last reference; the entry awaits server removal.
    Last,
    /// The subscriber did not hold the key.
    NotHeld,
}

#[derive(Debug, Default)]
pub(crate) struct SubscriptionTable {
    entries: BTreeMap<SubscriptionKey, SubscriptionEntry>,
    subscribers: HashMap<String, SubscriberRecord>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, key: &SubscriptionKey) -> Option<&SubscriptionEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn subscriber(&self, subscriber_id: &str) -> Option<&SubscriberRecord> {
        self.subscribers.get(subscriber_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn holds(&self, subscriber_id: &str, key: &SubscriptionKey) -> bool {
        self.subscribers
            .get(subscriber_id)
            .is_some_and(|r| r.keys.contains(key))
    }

    /// Create the entry for a key registered on `session`, held by `subscriber_id`.
    pub fn insert(
        &mut self,
        subscriber_id: &str,
        key: SubscriptionKey,
        event_type: &str,
        filter: Option<&SubscriptionFilter>,
        session: SessionIdentity,
    ) {
        let entry = SubscriptionEntry {
            key: key.clone(),
            event_type: event_type.to_string(),
            filter: filter.cloned(),
            ref_count: 0,
            subscribers: BTreeSet::new(),
            created_at_ms: now_ms(),
            session: Some(session),
        };
        self.entries.insert(key.clone(), entry);
        self.add_ref(subscriber_id, &key, event_type, filter);
    }

    /// Add a reference to an existing entry. Returns `false` if the key has
    /// no entry or the subscriber already holds it.
    pub fn add_ref(
        &mut self,
        subscriber_id: &str,
        key: &SubscriptionKey,
        event_type: &str,
        filter: Option<&SubscriptionFilter>,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        let record = self
            .subscribers
            .entry(subscriber_id.to_string())
            .or_insert_with(|| SubscriberRecord {
                subscriber_id: subscriber_id.to_string(),
                ..Default::default()
            });
        if !record.keys.insert(key.clone()) {
            return false;
        }
        record.event_types.insert(event_type.to_string());
        record.filter = filter.cloned();
        entry.subscribers.insert(subscriber_id.to_string());
        entry.ref_count += 1;
        true
    }

    /// Drop `subscriber_id`'s reference to `key`.
    ///
    /// On the last reference the entry stays in the table with
    /// `ref_count == 0` until [`remove_entry`](Self::remove_entry) is called.
    pub fn release(&mut self, subscriber_id: &str, key: &SubscriptionKey) -> Release {
        let held = match self.subscribers.get_mut(subscriber_id) {
            Some(record) => {
                let held = record.keys.remove(key);
                if held {
                    if let Some(entry) = self.entries.get(key) {
                        if !record.keys.iter().any(|k| {
                            self.entries
                                .get(k)
                                .is_some_and(|e| e.event_type == entry.event_type)
                        }) {
                            record.event_types.remove(&entry.event_type);
                        }
                    }
                }
                if record.keys.is_empty() {
                    self.subscribers.remove(subscriber_id);
                }
                held
            },
            None => false,
        };
        if !held {
            return Release::NotHeld;
        }

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.subscribers.remove(subscriber_id);
                entry.ref_count = entry.ref_count.saturating_sub(1);
                if entry.ref_count == 0 {
                    Release::Last
                } else {
                    Release::Shared(entry.ref_count)
                }
            },
            None => Release::NotHeld,
        }
    }

    pub fn remove_entry(&mut self, key: &SubscriptionKey) -> Option<SubscriptionEntry> {
        self.entries.remove(key)
    }

    pub fn set_session(&mut self, key: &SubscriptionKey, session: SessionIdentity) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.session = Some(session);
        }
    }

    /// Keys whose last reference is gone but whose server removal failed.
    pub fn pending_removals(&self) -> Vec<SubscriptionKey> {
        self.entries
            .values()
            .filter(|e| e.is_pending_removal())
            .map(|e| e.key.clone())
            .collect()
    }

    /// Live entries not registered on `session`.
    pub fn stale_entries(&self, session: &SessionIdentity) -> Vec<SubscriptionKey> {
        self.entries
            .values()
            .filter(|e| !e.is_pending_removal() && !e.is_registered_on(Some(session)))
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<SubscriptionInfo> {
        self.entries.values().map(SubscriptionEntry::info).collect()
    }

    #[cfg(test)]
    pub fn check_invariants(&self) {
        for entry in self.entries.values() {
            assert_eq!(entry.ref_count as usize, entry.subscribers.len(), "{}", entry.key);
            for sub in &entry.subscribers {
                assert!(self.holds(sub, &entry.key), "{} missing {}", sub, entry.key);
            }
        }
        for record in self.subscribers.values() {
            for key in &record.keys {
                assert!(
                    self.entries.get(key).is_some_and(|e| e.subscribers.contains(&record.subscriber_id)),
                    "{} holds orphan {}",
                    record.subscriber_id,
                    key
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> SessionIdentity {
        SessionIdentity::new(id, 1)
    }

    fn key(event_type: &str) -> SubscriptionKey {
        SubscriptionKey::new(event_type, None)
    }

    #[test]
    fn test_insert_and_share() {
        let mut table = SubscriptionTable::new();
        table.insert("a", key("vm-status"), "vm-status", None, session("s1"));
        assert!(table.add_ref("b", &key("vm-status"), "vm-status", None));
        assert!(!table.add_ref("b", &key("vm-status"), "vm-status", None), "second add is a no-op");

        let entry = table.entry(&key("vm-status")).unwrap();
        assert_eq!(entry.ref_count, 2);
        assert_eq!(table.subscriber_count(), 2);
        table.check_invariants();
    }

    #[test]
    fn test_release_to_zero_leaves_pending_entry() {
        let mut table = SubscriptionTable::new();
        table.insert("a", key("vm-status"), "vm-status", None, session("s1"));
        table.add_ref("b", &key("vm-status"), "vm-status", None);

        assert_eq!(table.release("a", &key("vm-status")), Release::Shared(1));
        assert_eq!(table.release("a", &key("vm-status")), Release::NotHeld);
        assert_eq!(table.release("b", &key("vm-status")), Release::Last);

        assert_eq!(table.pending_removals(), vec![key("vm-status")]);
        assert_eq!(table.subscriber_count(), 0);
        table.check_invariants();

        table.remove_entry(&key("vm-status"));
        assert!(table.snapshot().is_empty());
    }

    #[test]
    fn test_event_types_follow_keys() {
        let mut table = SubscriptionTable::new();
        let aws = SubscriptionFilter::new().with_providers(["aws"]);
        let aws_key = SubscriptionKey::new("vm-status", Some(&aws));
        table.insert("a", key("vm-status"), "vm-status", None, session("s1"));
        table.insert("a", aws_key.clone(), "vm-status", Some(&aws), session("s1"));
        table.insert("a", key("vpc-created"), "vpc-created", None, session("s1"));

        table.release("a", &key("vm-status"));
        let record = table.subscriber("a").unwrap();
        assert!(record.event_types.contains("vm-status"), "still held via filtered key");

        table.release("a", &aws_key);
        let record = table.subscriber("a").unwrap();
        assert!(!record.event_types.contains("vm-status"));
        assert!(record.event_types.contains("vpc-created"));
        table.check_invariants();
    }

    #[test]
    fn test_stale_entries() {
        let mut table = SubscriptionTable::new();
        table.insert("a", key("vm-status"), "vm-status", None, session("s1"));
        table.insert("a", key("vpc-created"), "vpc-created", None, session("s2"));

        assert_eq!(table.stale_entries(&session("s2")), vec![key("vm-status")]);
        table.set_session(&key("vm-status"), session("s2"));
        assert!(table.stale_entries(&session("s2")).is_empty());
    }

    #[test]
    fn test_snapshot_reports_pending_removal() {
        let mut table = SubscriptionTable::new();
        table.insert("a", key("vm-status"), "vm-status", None, session("s1"));
        table.release("a", &key("vm-status"));

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].pending_removal);
        assert_eq!(snapshot[0].session_id.as_deref(), Some("s1"));
    }
}
