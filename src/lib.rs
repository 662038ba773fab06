//! # skyclust-link
//!
//! Client for the SkyClust real-time event stream.
//!
//! One shared server-sent-events connection carries every event type. The
//! client keeps it alive with exponential backoff, resumes after the last
//! handled event using a persisted cursor, and deduplicates subscriptions
//! across callers with reference counting so the server sees each
//! `(event type, filter)` pair once.
//!
//! ```rust,no_run
//! use skyclust_link::{EventHandlers, RealtimeClient, SubscriptionFilter};
//!
//! # async fn example() -> skyclust_link::Result<()> {
//! let client = RealtimeClient::builder()
//!     .base_url("https://api.skyclust.example")
//!     .token("eyJhbGc...")
//!     .event_handlers(
//!         EventHandlers::new()
//!             .on_connected(|info| println!("session {}", info.connection_id))
//!             .on_event("vm-status", |event| println!("{}", event.data)),
//!     )
//!     .build()?;
//!
//! client.connect().await?;
//! let filter = SubscriptionFilter::new().with_providers(["aws"]);
//! client.subscribe(&["vm-status"], Some(filter), None).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod codec;
pub mod compression;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod cursor_store;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod receiver;
pub mod sse;
pub mod subscription;
pub mod timeouts;

pub use auth::{ArcDynTokenProvider, DynamicTokenProvider, TokenSource};
pub use client::{RealtimeClient, RealtimeClientBuilder};
pub use codec::{CompressionDetection, PayloadCodec};
pub use config::LinkConfig;
pub use connection::{
    ByteStream, ConnectionState, HttpSseConnector, HttpSubscriptionRpc, ReconnectPolicy,
    StreamConnector, SubscriptionRpc, Transport, TransportStatus,
};
pub use cursor::EventCursor;
pub use cursor_store::{CursorStore, FileCursorStore, MemoryCursorStore, DEFAULT_CURSOR_KEY};
pub use error::{LinkError, Result};
pub use event_handlers::{
    ConnectionError, ConnectionErrorKind, DisconnectReason, EventHandlers, TransportEvent,
};
pub use models::{
    ConnectedInfo, ConnectionOptions, RawFrame, SessionIdentity, StreamEvent, SubscriptionInfo,
    SubscriptionRequest, SubscriptionStatus,
};
pub use receiver::{EventReceiver, COMMIT_BATCH};
pub use sse::{DecodedChunk, SseDecoder};
pub use subscription::{
    ResubscribeReport, SubscribeOutcome, SubscriptionFilter, SubscriptionKey, SubscriptionManager,
    SyncOutcome, UnsubscribeOutcome, DEFAULT_PINNED_EVENT_TYPES,
};
pub use timeouts::LinkTimeouts;
