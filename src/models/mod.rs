//! Data models for the event stream client.
//!
//! Wire frames, decoded events, session identity, subscription requests and
//! the read-only snapshots handed back to callers.

mod connection_options;
mod raw_frame;
mod session_identity;
mod stream_event;
mod subscription_info;
mod subscription_request;

#[cfg(test)]
mod tests;

pub use connection_options::ConnectionOptions;
pub use raw_frame::{RawFrame, CONNECTED_EVENT, DEFAULT_EVENT};
pub use session_identity::SessionIdentity;
pub use stream_event::{ConnectedInfo, StreamEvent};
pub use subscription_info::{SubscriptionInfo, SubscriptionStatus};
pub use subscription_request::SubscriptionRequest;
