//! Typed event registry for the event stream client.
//!
//! The transport publishes everything it observes on one multiplexed channel
//! of [`TransportEvent`]s. [`EventHandlers`] is the callback side: register the
//! hooks you need, then drive them with [`EventHandlers::run`]:
//!
//! - [`on_connected`](EventHandlers::on_connected): a session was issued
//! - [`on_event`](EventHandlers::on_event): an application event of one type
//! - [`on_any_event`](EventHandlers::on_any_event): every application event
//! - [`on_disconnect`](EventHandlers::on_disconnect): the stream closed
//! - [`on_error`](EventHandlers::on_error): connection, auth or decode errors
//!
//! # Example
//!
//! ```rust,no_run
//! use skyclust_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connected(|info| println!("session {}", info.connection_id))
//!     .on_event("vm-status", |event| println!("vm: {}", event.data))
//!     .on_disconnect(|reason| println!("Disconnected: {}", reason))
//!     .on_error(|err| eprintln!("error (recoverable={}): {}", err.recoverable, err));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::LinkError;
use crate::models::{ConnectedInfo, StreamEvent};
use crate::receiver::EventReceiver;

/// Everything the transport reports, in the order it happened.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The server issued a session on a freshly opened stream.
    Connected(ConnectedInfo),
    /// A decoded application event.
    Event(StreamEvent),
    /// The stream closed, intentionally or not.
    Disconnected(DisconnectReason),
    /// A connection, authentication or decode error.
    Error(ConnectionError),
}

/// Why the stream went away, as seen by `on_disconnect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Short text, e.g. "stream ended" or "idle timeout".
    pub message: String,
    /// HTTP status, if the stream was refused with one.
    pub code: Option<u16>,
    /// Closed by an explicit `disconnect()`, not by the server or the network.
    pub requested: bool,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            requested: false,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
            requested: false,
        }
    }

    pub(crate) fn requested() -> Self {
        Self {
            message: "Client disconnected".to_string(),
            code: None,
            requested: true,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Category of a [`ConnectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Network failure, stream end or timeout.
    Network,
    /// Credentials rejected, or the stream failed before a session was issued.
    Authentication,
    /// One frame could not be decoded; the stream continues.
    Decode,
    /// The reconnect budget ran out.
    ReconnectExhausted,
    Other,
}

/// Payload of `on_error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    /// What failed.
    pub message: String,
    /// `false` once reconnecting has been given up or cannot help.
    pub recoverable: bool,
    pub kind: ConnectionErrorKind,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
            kind: ConnectionErrorKind::Other,
        }
    }

    pub fn with_kind(mut self, kind: ConnectionErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Classify a [`LinkError`] for the error handler.
    pub fn from_link_error(err: &LinkError, recoverable: bool) -> Self {
        let kind = match err {
            LinkError::AuthenticationError(_) => ConnectionErrorKind::Authentication,
            LinkError::DecodeError(_) => ConnectionErrorKind::Decode,
            LinkError::ReconnectExhausted(_) => ConnectionErrorKind::ReconnectExhausted,
            LinkError::NetworkError(_) | LinkError::StreamError(_) | LinkError::TimeoutError(_) => {
                ConnectionErrorKind::Network
            },
            _ => ConnectionErrorKind::Other,
        };
        Self::new(err.to_string(), recoverable).with_kind(kind)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type OnConnectedCallback = Arc<dyn Fn(&ConnectedInfo) + Send + Sync>;

/// Type alias for application event callbacks.
pub type OnEventCallback = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

pub type OnDisconnectCallback = Arc<dyn Fn(&DisconnectReason) + Send + Sync>;

pub type OnErrorCallback = Arc<dyn Fn(&ConnectionError) + Send + Sync>;

/// Callback registry fed from the transport's event channel.
///
/// All handlers are optional. Several handlers may be registered for the same
/// event type; they run in registration order, before any `on_any_event`
/// handlers.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connected: Vec<OnConnectedCallback>,
    pub(crate) on_event: HashMap<String, Vec<OnEventCallback>>,
    pub(crate) on_any_event: Vec<OnEventCallback>,
    pub(crate) on_disconnect: Vec<OnDisconnectCallback>,
    pub(crate) on_error: Vec<OnErrorCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.on_event.keys().collect();
        types.sort();
        f.debug_struct("EventHandlers")
            .field("on_connected", &self.on_connected.len())
            .field("on_event", &types)
            .field("on_any_event", &self.on_any_event.len())
            .field("on_disconnect", &self.on_disconnect.len())
            .field("on_error", &self.on_error.len())
            .finish()
    }
}

impl EventHandlers {
    /// No callbacks; every event is dropped after dispatch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when the server issues a session.
    pub fn on_connected(mut self, f: impl Fn(&ConnectedInfo) + Send + Sync + 'static) -> Self {
        self.on_connected.push(Arc::new(f));
        self
    }

    /// Register a callback for one application event type.
    ///
    /// # Example
    /// ```rust
    /// use skyclust_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_event("vm-status", |event| println!("{}", event.data));
    /// ```
    pub fn on_event(
        mut self,
        event_type: impl Into<String>,
        f: impl Fn(&StreamEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event
            .entry(event_type.into())
            .or_default()
            .push(Arc::new(f));
        self
    }

    /// Register a callback invoked for every application event.
    pub fn on_any_event(mut self, f: impl Fn(&StreamEvent) + Send + Sync + 'static) -> Self {
        self.on_any_event.push(Arc::new(f));
        self
    }

    /// Register a callback invoked when the stream closes.
    pub fn on_disconnect(mut self, f: impl Fn(&DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect.push(Arc::new(f));
        self
    }

    /// Register a callback invoked when an error occurs.
    ///
    /// `recoverable` on the [`ConnectionError`] tells a transient failure
    /// (a reconnect is pending) from a terminal one.
    pub fn on_error(mut self, f: impl Fn(&ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error.push(Arc::new(f));
        self
    }

    /// `false` when nothing would observe dispatched events.
    pub fn has_any(&self) -> bool {
        !self.on_connected.is_empty()
            || !self.on_event.is_empty()
            || !self.on_any_event.is_empty()
            || !self.on_disconnect.is_empty()
            || !self.on_error.is_empty()
    }

    /// Invoke every handler registered for `event`.
    pub fn dispatch(&self, event: &TransportEvent) {
        match event {
            TransportEvent::Connected(info) => {
                for cb in &self.on_connected {
                    cb(info);
                }
            },
            TransportEvent::Event(ev) => {
                if let Some(handlers) = self.on_event.get(&ev.event_type) {
                    for cb in handlers {
                        cb(ev);
                    }
                }
                for cb in &self.on_any_event {
                    cb(ev);
                }
            },
            TransportEvent::Disconnected(reason) => {
                for cb in &self.on_disconnect {
                    cb(reason);
                }
            },
            TransportEvent::Error(err) => {
                for cb in &self.on_error {
                    cb(err);
                }
            },
        }
    }

    /// Drain the event channel, dispatching in receive order, until the
    /// transport shuts down. An event's cursor becomes eligible for saving
    /// only after every handler for it has returned.
    pub async fn run(self, mut rx: EventReceiver) {
        while let Some(event) = rx.recv().await {
            self.dispatch(&event);
        }
        log::debug!("[skyclust-link] Event channel closed, handler loop exiting");
    }

    /// Spawn [`run`](Self::run) on the current tokio runtime.
    pub fn spawn(self, rx: EventReceiver) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::EventCursor;
    use crate::cursor_store::{CursorStore, MemoryCursorStore};
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn event(event_type: &str) -> TransportEvent {
        TransportEvent::Event(StreamEvent::new(event_type, None, json!({})))
    }

    #[test]
    fn test_dispatch_by_event_type() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let typed = seen.clone();
        let any = seen.clone();
        let handlers = EventHandlers::new()
            .on_event("vm-status", move |ev| typed.lock().push(format!("typed:{}", ev.event_type)))
            .on_any_event(move |ev| any.lock().push(format!("any:{}", ev.event_type)));

        handlers.dispatch(&event("vm-status"));
        handlers.dispatch(&event("vpc-created"));

        assert_eq!(
            *seen.lock(),
            vec!["typed:vm-status", "any:vm-status", "any:vpc-created"]
        );
    }

    #[test]
    fn test_lifecycle_callbacks() {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        let handlers = EventHandlers::new()
            .on_connected(move |info| l1.lock().push(info.connection_id.clone()))
            .on_disconnect(move |reason| l2.lock().push(reason.to_string()))
            .on_error(move |err| l3.lock().push(format!("{:?}", err.kind)));
        assert!(handlers.has_any());

        handlers.dispatch(&TransportEvent::Connected(ConnectedInfo {
            connection_id: "c1".into(),
            message: None,
            timestamp: None,
        }));
        handlers.dispatch(&TransportEvent::Disconnected(DisconnectReason::with_code("refused", 503)));
        handlers.dispatch(&TransportEvent::Error(ConnectionError::from_link_error(
            &LinkError::AuthenticationError("401".into()),
            false,
        )));

        assert_eq!(*log.lock(), vec!["c1", "refused (code: 503)", "Authentication"]);
    }

    #[test]
    fn test_error_classification() {
        let err = ConnectionError::from_link_error(&LinkError::ReconnectExhausted(3), false);
        assert_eq!(err.kind, ConnectionErrorKind::ReconnectExhausted);
        assert!(!err.recoverable);
        assert_eq!(err.to_string(), "Max reconnection attempts (3) reached");

        let err = ConnectionError::from_link_error(&LinkError::StreamError("eof".into()), true);
        assert_eq!(err.kind, ConnectionErrorKind::Network);
    }

    #[tokio::test]
    async fn test_run_drains_channel_in_order() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = seen.clone();
        let handlers = EventHandlers::new().on_any_event(move |ev| sink.lock().push(ev.event_type.clone()));

        let (tx, rx) = mpsc::channel(8);
        for t in ["a", "b", "c"] {
            tx.send(event(t)).await.unwrap();
        }
        drop(tx);
        handlers
            .run(EventReceiver::new(rx, Arc::new(MemoryCursorStore::new())))
            .await;

        assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_cursor_saved_only_after_handler_returns() {
        let store = Arc::new(MemoryCursorStore::new());
        let observed = Arc::new(Mutex::new(Vec::<Option<EventCursor>>::new()));
        let (handler_store, sink) = (store.clone(), observed.clone());
        let handlers = EventHandlers::new().on_any_event(move |_| {
            sink.lock().push(handler_store.load().unwrap());
        });

        let (tx, rx) = mpsc::channel(8);
        for id in ["1", "2"] {
            let ev = StreamEvent::new("vm-status", Some(EventCursor::new(id)), json!({}));
            tx.send(TransportEvent::Event(ev)).await.unwrap();
        }
        drop(tx);
        handlers.run(EventReceiver::new(rx, store.clone())).await;

        // Neither handler saw its own cursor stored while it ran.
        assert_eq!(*observed.lock(), vec![None, None]);
        assert_eq!(store.load().unwrap(), Some(EventCursor::new("2")));
    }
}
