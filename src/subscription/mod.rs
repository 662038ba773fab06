//! Subscription filters, the reference-counted subscription table and the
//! manager that keeps the server in step with it.

pub mod filter;
pub mod manager;
pub(crate) mod table;

pub use filter::{SubscriptionFilter, SubscriptionKey, CREDENTIAL_IDS, PROVIDERS, REGIONS};
pub use manager::{
    ResubscribeReport, SubscribeOutcome, SubscriptionManager, SyncOutcome, UnsubscribeOutcome,
    DEFAULT_PINNED_EVENT_TYPES, SYNC_SUBSCRIBER_ID,
};
