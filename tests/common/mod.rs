#![allow(dead_code)]
//! In-process fakes for the stream connector and the subscription RPCs.
//!
//! Every `open()` on [`MockConnector`] yields a fresh [`StreamHandle`] on the
//! receiver returned by [`MockConnector::new`]; the test writes SSE text into
//! it and closes or fails it at will.

use bytes::Bytes;
use parking_lot::Mutex;
use skyclust_link::{
    ByteStream, ConnectionOptions, EventCursor, EventReceiver, LinkError, LinkTimeouts,
    MemoryCursorStore, Result, SessionIdentity, StreamConnector, SubscriptionRequest,
    SubscriptionRpc, TokenSource, Transport, TransportEvent,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── SSE text helpers ────────────────────────────────────────────────────────

pub fn connected(connection_id: &str) -> String {
    format!(
        "event: connected\ndata: {{\"connection_id\":\"{}\",\"message\":\"SSE connection established\"}}\n\n",
        connection_id
    )
}

pub fn frame(id: &str, event: &str, data: &str) -> String {
    format!("id: {}\nevent: {}\ndata: {}\n\n", id, event, data)
}

pub fn retry(ms: u64) -> String {
    format!("retry: {}\n\n", ms)
}

pub fn heartbeat() -> String {
    ": heartbeat\n\n".to_string()
}

// ── Stream connector ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCall {
    pub token: String,
    pub cursor: Option<String>,
}

/// Server side of one opened stream.
pub struct StreamHandle {
    pub call: OpenCall,
    tx: mpsc::UnboundedSender<Result<Bytes>>,
}

impl StreamHandle {
    pub fn send(&self, text: impl Into<String>) {
        let _ = self.tx.send(Ok(Bytes::from(text.into())));
    }

    pub fn fail(&self, message: &str) {
        let _ = self.tx.send(Err(LinkError::StreamError(message.to_string())));
    }

    /// End the body as if the server closed the response.
    pub fn close(self) {}
}

pub struct MockConnector {
    calls: Mutex<Vec<OpenCall>>,
    failures: Mutex<VecDeque<LinkError>>,
    /// Never resolve `open()` while set.
    hang: Mutex<bool>,
    opened_tx: mpsc::UnboundedSender<StreamHandle>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<StreamHandle>) {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            hang: Mutex::new(false),
            opened_tx,
        });
        (connector, opened_rx)
    }

    /// Fail the next `open()` with `error`. Queued failures are used in order.
    pub fn fail_next(&self, error: LinkError) {
        self.failures.lock().push_back(error);
    }

    pub fn set_hang(&self, hang: bool) {
        *self.hang.lock() = hang;
    }

    pub fn calls(&self) -> Vec<OpenCall> {
        self.calls.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait::async_trait]
impl StreamConnector for MockConnector {
    async fn open(&self, token: &str, cursor: Option<&EventCursor>) -> Result<ByteStream> {
        let call = OpenCall {
            token: token.to_string(),
            cursor: cursor.map(|c| c.as_str().to_string()),
        };
        self.calls.lock().push(call.clone());

        let hang = *self.hang.lock();
        if hang {
            std::future::pending::<()>().await;
        }
        let failure = self.failures.lock().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel::<Result<Bytes>>();
        let _ = self.opened_tx.send(StreamHandle { call, tx });
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }
}

// ── Subscription RPCs ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcKind {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub kind: RpcKind,
    pub session_id: String,
    pub token: String,
    pub request: SubscriptionRequest,
}

#[derive(Default)]
pub struct MockRpc {
    calls: Mutex<Vec<RpcCall>>,
    /// Remaining forced failures per (kind, event type).
    failures: Mutex<HashMap<(RpcKind, String), usize>>,
    delay: Mutex<Option<Duration>>,
}

impl MockRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, kind: RpcKind, event_type: &str, times: usize) {
        self.failures.lock().insert((kind, event_type.to_string()), times);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<RpcCall> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, kind: RpcKind) -> Vec<RpcCall> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    pub fn count(&self, kind: RpcKind, event_type: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.kind == kind && c.request.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    async fn handle(
        &self,
        kind: RpcKind,
        session: &SessionIdentity,
        token: &str,
        request: &SubscriptionRequest,
    ) -> Result<()> {
        self.calls.lock().push(RpcCall {
            kind,
            session_id: session.id.clone(),
            token: token.to_string(),
            request: request.clone(),
        });

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&(kind, request.event_type.clone())) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LinkError::ServerError {
                    status_code: 500,
                    message: format!("forced failure for {}", request.event_type),
                });
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SubscriptionRpc for MockRpc {
    async fn subscribe(
        &self,
        session: &SessionIdentity,
        token: &str,
        request: &SubscriptionRequest,
    ) -> Result<()> {
        self.handle(RpcKind::Subscribe, session, token, request).await
    }

    async fn unsubscribe(
        &self,
        session: &SessionIdentity,
        token: &str,
        request: &SubscriptionRequest,
    ) -> Result<()> {
        self.handle(RpcKind::Unsubscribe, session, token, request).await
    }
}

// ── Event helpers ───────────────────────────────────────────────────────────

/// Receive events until `pred` matches, failing after `timeout`.
pub async fn next_matching(
    rx: &mut EventReceiver,
    timeout: Duration,
    mut pred: impl FnMut(&TransportEvent) -> bool,
) -> TransportEvent {
    tokio::time::timeout(timeout, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub async fn next_stream(
    rx: &mut mpsc::UnboundedReceiver<StreamHandle>,
    timeout: Duration,
) -> StreamHandle {
    tokio::time::timeout(timeout, rx.recv())
        .await
        .expect("timed out waiting for open")
        .expect("connector dropped")
}

/// Poll `cond` every few milliseconds until it holds, failing after `timeout`.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(timeout, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ── Harness ─────────────────────────────────────────────────────────────────

/// Deterministic reconnects: no jitter, short base delay.
pub fn fast_options() -> ConnectionOptions {
    ConnectionOptions::default()
        .with_reconnect_delay_ms(20)
        .with_max_reconnect_delay_ms(200)
        .with_backoff_jitter_ms(0)
        .with_server_retry_jitter_ms(0)
}

pub struct Harness {
    pub transport: Transport,
    pub events: EventReceiver,
    pub connector: Arc<MockConnector>,
    pub streams: mpsc::UnboundedReceiver<StreamHandle>,
    pub rpc: Arc<MockRpc>,
    pub store: Arc<MemoryCursorStore>,
}

impl Harness {
    pub fn new(options: ConnectionOptions, timeouts: LinkTimeouts) -> Self {
        Self::with_store(options, timeouts, Arc::new(MemoryCursorStore::new()))
    }

    pub fn with_store(
        options: ConnectionOptions,
        timeouts: LinkTimeouts,
        store: Arc<MemoryCursorStore>,
    ) -> Self {
        init_logging();
        let (connector, streams) = MockConnector::new();
        let rpc = MockRpc::new();
        let (transport, events) = Transport::spawn(
            connector.clone(),
            rpc.clone(),
            store.clone(),
            TokenSource::None,
            options,
            timeouts,
        );
        Self {
            transport,
            events,
            connector,
            streams,
            rpc,
            store,
        }
    }

    /// Connect, then issue `session_id` on the opened stream and wait for it.
    pub async fn open_session(&mut self, session_id: &str) -> StreamHandle {
        self.transport.connect("tok").await.expect("connect failed");
        let handle = next_stream(&mut self.streams, WAIT).await;
        handle.send(connected(session_id));
        self.expect_connected(session_id).await;
        handle
    }

    pub async fn expect_connected(&mut self, session_id: &str) {
        let event = next_matching(&mut self.events, WAIT, |e| {
            matches!(e, TransportEvent::Connected(_))
        })
        .await;
        match event {
            TransportEvent::Connected(info) => assert_eq!(info.connection_id, session_id),
            other => panic!("unexpected {:?}", other),
        }
        wait_until(WAIT, || {
            self.transport.session().is_some_and(|s| s.id == session_id)
        })
        .await;
    }
}

pub const WAIT: Duration = Duration::from_secs(5);
