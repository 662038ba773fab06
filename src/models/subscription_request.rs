use serde::{Deserialize, Serialize};

use crate::subscription::filter::SubscriptionFilter;

/// Body of the subscribe/unsubscribe RPC.
///
/// ```json
/// { "event_type": "vm-status", "filters": { "providers": ["aws"], "regions": ["us-east-1"] } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<SubscriptionFilter>,
}

impl SubscriptionRequest {
    pub fn new(event_type: impl Into<String>, filter: Option<&SubscriptionFilter>) -> Self {
        Self {
            event_type: event_type.into(),
            filters: filter.filter(|f| !f.is_empty()).cloned(),
        }
    }
}
