//! Realtime client with builder pattern.
//!
//! Wires the HTTP event stream, the subscription RPCs, the cursor store and
//! the subscription manager into one handle.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::auth::TokenSource;
use crate::connection::{
    ConnectionState, HttpSseConnector, HttpSubscriptionRpc, StreamConnector, SubscriptionRpc,
    Transport, TransportStatus,
};
use crate::cursor_store::{CursorStore, MemoryCursorStore};
use crate::error::{LinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::models::{ConnectionOptions, SubscriptionStatus};
use crate::receiver::EventReceiver;
use crate::subscription::{
    SubscribeOutcome, SubscriptionFilter, SubscriptionManager, SyncOutcome, UnsubscribeOutcome,
    DEFAULT_PINNED_EVENT_TYPES,
};
use crate::timeouts::LinkTimeouts;

/// Realtime event client.
///
/// Use [`RealtimeClientBuilder`] to construct instances.
///
/// # Examples
///
/// ```rust,no_run
/// use skyclust_link::{EventHandlers, RealtimeClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RealtimeClient::builder()
///     .base_url("https://api.skyclust.example")
///     .token("eyJhbGc...")
///     .event_handlers(EventHandlers::new().on_event("vm-status", |event| {
///         println!("{}: {}", event.event_type, event.data);
///     }))
///     .build()?;
///
/// client.connect().await?;
/// client.subscribe(&["vm-status"], None, None).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Transport,
    manager: SubscriptionManager,
    token: Option<String>,
    token_source: TokenSource,
    events: Mutex<Option<EventReceiver>>,
    timeouts: LinkTimeouts,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("state", &self.inner.transport.state())
            .field("token_source", &self.inner.token_source)
            .finish()
    }
}

impl RealtimeClient {
    pub fn builder() -> RealtimeClientBuilder {
        RealtimeClientBuilder::new()
    }

    /// Open the stream using the configured token, or one fetched from the
    /// token source.
    pub async fn connect(&self) -> Result<()> {
        let token = match self.inner.token {
            Some(ref token) => token.clone(),
            None => self.inner.token_source.fetch().await?,
        };
        self.inner.transport.connect(token).await
    }

    /// Open the stream with an explicit token.
    pub async fn connect_with_token(&self, token: impl Into<String>) -> Result<()> {
        self.inner.transport.connect(token).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.inner.transport.disconnect().await
    }

    /// Stop the control task. The client is unusable afterwards.
    pub async fn shutdown(&self) {
        self.inner.transport.shutdown().await;
    }

    pub async fn subscribe<S: AsRef<str>>(
        &self,
        event_types: &[S],
        filter: Option<SubscriptionFilter>,
        subscriber_id: Option<String>,
    ) -> Result<SubscribeOutcome> {
        self.inner
            .manager
            .subscribe(event_types, filter, subscriber_id)
            .await
    }

    pub async fn unsubscribe(&self, subscriber_id: &str) -> Result<UnsubscribeOutcome> {
        self.inner.manager.unsubscribe(subscriber_id).await
    }

    pub async fn sync_subscriptions<S: AsRef<str>>(
        &self,
        desired: &[S],
        filter: Option<SubscriptionFilter>,
    ) -> Result<SyncOutcome> {
        self.inner.manager.sync_subscriptions(desired, filter).await
    }

    pub async fn update_subscription<S: AsRef<str>>(
        &self,
        subscriber_id: &str,
        event_types: &[S],
        filter: Option<SubscriptionFilter>,
    ) -> Result<SubscribeOutcome> {
        self.inner
            .manager
            .update_subscription(subscriber_id, event_types, filter)
            .await
    }

    pub async fn subscription_status(&self) -> SubscriptionStatus {
        self.inner.manager.get_subscription_status().await
    }

    pub fn status(&self) -> TransportStatus {
        self.inner.transport.status()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.transport.state()
    }

    /// Take the raw event receiver.
    ///
    /// Returns `None` when event handlers were configured (they own the
    /// receiver) or when it was already taken. Cursors are saved as the
    /// receiver is drained; call [`EventReceiver::commit`] after handling the
    /// last event if the process is about to exit.
    pub fn take_events(&self) -> Option<EventReceiver> {
        self.inner.events.lock().take()
    }

    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.inner.manager
    }

    pub fn timeouts(&self) -> &LinkTimeouts {
        &self.inner.timeouts
    }
}

/// Builder for configuring [`RealtimeClient`] instances.
pub struct RealtimeClientBuilder {
    base_url: Option<String>,
    token: Option<String>,
    token_source: TokenSource,
    connection_options: ConnectionOptions,
    timeouts: LinkTimeouts,
    cursor_store: Option<Arc<dyn CursorStore>>,
    event_handlers: Option<EventHandlers>,
    pinned_event_types: Vec<String>,
    connector: Option<Arc<dyn StreamConnector>>,
    rpc: Option<Arc<dyn SubscriptionRpc>>,
}

impl Default for RealtimeClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            token: None,
            token_source: TokenSource::None,
            connection_options: ConnectionOptions::default(),
            timeouts: LinkTimeouts::default(),
            cursor_store: None,
            event_handlers: None,
            pinned_event_types: DEFAULT_PINNED_EVENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            connector: None,
            rpc: None,
        }
    }

    /// API base URL. Required unless both a connector and an RPC client are
    /// supplied.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Token used by [`RealtimeClient::connect`].
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Source for tokens on reconnect after an authentication failure, and
    /// for `connect()` when no token is set.
    pub fn token_source(mut self, source: TokenSource) -> Self {
        self.token_source = source;
        self
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    pub fn timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Where the resume cursor is persisted. Defaults to memory.
    pub fn cursor_store(mut self, store: Arc<dyn CursorStore>) -> Self {
        self.cursor_store = Some(store);
        self
    }

    /// Dispatch events to callbacks instead of exposing the receiver.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = Some(handlers);
        self
    }

    pub fn pinned_event_types<I, S>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pinned_event_types = event_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn connector(mut self, connector: Arc<dyn StreamConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn subscription_rpc(mut self, rpc: Arc<dyn SubscriptionRpc>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    /// Build the client and start its background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<RealtimeClient> {
        let (connector, rpc) = match (self.connector, self.rpc) {
            (Some(connector), Some(rpc)) => (connector, rpc),
            (connector, rpc) => {
                let base_url = self.base_url.as_deref().ok_or_else(|| {
                    LinkError::ConfigurationError("base_url is required".into())
                })?;
                let connector: Arc<dyn StreamConnector> = match connector {
                    Some(c) => c,
                    None => Arc::new(HttpSseConnector::new(base_url, &self.timeouts)?),
                };
                let rpc: Arc<dyn SubscriptionRpc> = match rpc {
                    Some(r) => r,
                    None => Arc::new(HttpSubscriptionRpc::new(base_url, &self.timeouts)?),
                };
                (connector, rpc)
            },
        };
        let cursor_store = self
            .cursor_store
            .unwrap_or_else(|| Arc::new(MemoryCursorStore::new()));

        let (transport, events_rx) = Transport::spawn(
            connector,
            rpc,
            cursor_store,
            self.token_source.clone(),
            self.connection_options,
            self.timeouts.clone(),
        );
        let manager = SubscriptionManager::new(
            transport.clone(),
            self.timeouts.session_wait_timeout,
            self.pinned_event_types,
        );

        let mut tasks = vec![manager.spawn_session_watcher()];
        let events = match self.event_handlers {
            Some(handlers) => {
                tasks.push(handlers.spawn(events_rx));
                None
            },
            None => Some(events_rx),
        };

        log::debug!(
            "[skyclust-link] Client built (base_url={:?}, handlers={})",
            self.base_url,
            events.is_none()
        );

        Ok(RealtimeClient {
            inner: Arc::new(ClientInner {
                transport,
                manager,
                token: self.token,
                token_source: self.token_source,
                events: Mutex::new(events),
                timeouts: self.timeouts,
                tasks,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_requires_base_url() {
        let err = RealtimeClient::builder().build().unwrap_err();
        assert!(matches!(err, LinkError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn test_build_rejects_bad_url() {
        let err = RealtimeClient::builder()
            .base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, LinkError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn test_receiver_only_without_handlers() {
        let client = RealtimeClient::builder()
            .base_url("http://localhost:8080")
            .build()
            .unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.take_events().is_some());
        assert!(client.take_events().is_none());

        let client = RealtimeClient::builder()
            .base_url("http://localhost:8080")
            .event_handlers(EventHandlers::new())
            .build()
            .unwrap();
        assert!(client.take_events().is_none());
    }

    #[tokio::test]
    async fn test_connect_without_token_fails() {
        let client = RealtimeClient::builder()
            .base_url("http://localhost:8080")
            .build()
            .unwrap();
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, LinkError::AuthenticationError(_)));
    }
}
