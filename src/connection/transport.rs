//! Single durable event stream, owned by a background control task.
//!
//! The public [`Transport`] handle is cheap to clone. Commands travel to the
//! control task over an mpsc channel with oneshot replies; the control task
//! is the only writer of connection state and publishes it read-only through
//! a `watch` channel. Everything observed on the stream is forwarded, in
//! receive order, on one multiplexed [`TransportEvent`] channel.
//!
//! Handles:
//!
//! - Stream open with the persisted cursor (`Last-Event-ID`)
//! - The `connected` handshake that issues the session identity
//! - Decoding and dispatch of data frames (cursors are committed by the
//!   [`EventReceiver`] once the consumer has handled them)
//! - Liveness (any bytes, heartbeat comments included, reset the idle window)
//! - Reconnect scheduling via [`ReconnectPolicy`]
//! - Subscribe/unsubscribe RPCs bound to the current session, cancelled when
//!   the session ends

use bytes::Bytes;
use futures_util::{future::BoxFuture, FutureExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;

use crate::auth::TokenSource;
use crate::codec::PayloadCodec;
use crate::connection::http::{ByteStream, StreamConnector, SubscriptionRpc};
use crate::connection::reconnect::ReconnectPolicy;
use crate::connection::state::{ConnectionState, TransportStatus};
use crate::cursor::EventCursor;
use crate::cursor_store::CursorStore;
use crate::error::{LinkError, Result};
use crate::event_handlers::{ConnectionError, ConnectionErrorKind, DisconnectReason, TransportEvent};
use crate::models::{ConnectedInfo, ConnectionOptions, RawFrame, SessionIdentity, StreamEvent, SubscriptionRequest};
use crate::receiver::EventReceiver;
use crate::sse::SseDecoder;
use crate::subscription::filter::SubscriptionKey;
use crate::timeouts::LinkTimeouts;

/// Stand-in deadline for disabled timers.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

const COMMAND_CHANNEL_CAPACITY: usize = 64;

// ── Commands ────────────────────────────────────────────────────────────────

enum TransportCmd {
    Connect {
        token: String,
        result_tx: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        result_tx: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Session-scoped bookkeeping shared between the handle and the control task.
///
/// `generation` mirrors the published status so RPC results can be recorded
/// atomically against the session they were issued on.
#[derive(Default)]
struct SessionBook {
    token: Option<String>,
    generation: u64,
    server_subscriptions: HashSet<SubscriptionKey>,
}

// ── Transport (public handle) ───────────────────────────────────────────────

/// Handle to the event stream.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    cmd_tx: mpsc::Sender<TransportCmd>,
    status_rx: watch::Receiver<TransportStatus>,
    book: Arc<Mutex<SessionBook>>,
    rpc: Arc<dyn SubscriptionRpc>,
    rpc_timeout: Duration,
    _task: JoinHandle<()>,
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(TransportCmd::Shutdown);
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("status", &*self.inner.status_rx.borrow())
            .finish()
    }
}

impl Transport {
    /// Start the control task. Must be called from within a tokio runtime.
    ///
    /// Returns the handle and the receiving end of the event channel. The
    /// receiver must be drained (see [`EventHandlers::run`]); a full channel
    /// pauses the stream. Cursors reach `cursor_store` through the receiver,
    /// only for events the consumer has handled.
    ///
    /// [`EventHandlers::run`]: crate::EventHandlers::run
    pub fn spawn(
        connector: Arc<dyn StreamConnector>,
        rpc: Arc<dyn SubscriptionRpc>,
        cursor_store: Arc<dyn CursorStore>,
        token_source: TokenSource,
        options: ConnectionOptions,
        timeouts: LinkTimeouts,
    ) -> (Self, EventReceiver) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(options.event_channel_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(TransportStatus::default());
        let book = Arc::new(Mutex::new(SessionBook::default()));
        let events = EventReceiver::new(event_rx, cursor_store.clone());

        let control = ControlLoop {
            cmd_rx,
            status_tx,
            event_tx,
            book: book.clone(),
            connector,
            cursor_store,
            token_source,
            codec: PayloadCodec::new().with_heuristic(options.compression_heuristic),
            policy: ReconnectPolicy::from_options(&options),
            auto_reconnect: options.auto_reconnect,
            timeouts: timeouts.clone(),
            token: None,
            generation: 0,
            stream: None,
            decoder: SseDecoder::new(),
            pending_open: None,
            pending_reply: None,
            reconnect_at: None,
            idle_deadline: TokioInstant::now() + FAR_FUTURE,
        };
        let task = tokio::spawn(control.run());

        let transport = Self {
            inner: Arc::new(TransportInner {
                cmd_tx,
                status_rx,
                book,
                rpc,
                rpc_timeout: timeouts.rpc_timeout,
                _task: task,
            }),
        };
        (transport, events)
    }

    /// Open the stream with `token`.
    ///
    /// No-op when already open with the same token. Fails fast with
    /// [`LinkError::ConnectInFlight`] while another connect is underway.
    /// Resolves once the stream is accepted; the session identity arrives
    /// afterwards (see [`wait_for_session`](Self::wait_for_session)).
    pub async fn connect(&self, token: impl Into<String>) -> Result<()> {
        let (result_tx, result_rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(TransportCmd::Connect {
                token: token.into(),
                result_tx,
            })
            .await
            .map_err(|_| LinkError::Closed)?;
        result_rx.await.map_err(|_| LinkError::Closed)?
    }

    /// Close the stream and cancel any pending reconnect. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        let (result_tx, result_rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(TransportCmd::Disconnect { result_tx })
            .await
            .map_err(|_| LinkError::Closed)?;
        result_rx.await.map_err(|_| LinkError::Closed)
    }

    /// Stop the control task. The event channel closes once it exits.
    pub async fn shutdown(&self) {
        let _ = self.inner.cmd_tx.send(TransportCmd::Shutdown).await;
    }

    pub fn status(&self) -> TransportStatus {
        self.inner.status_rx.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status_rx.borrow().state
    }

    pub fn session(&self) -> Option<SessionIdentity> {
        self.inner.status_rx.borrow().session.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Subscribe to status changes.
    pub fn session_watch(&self) -> watch::Receiver<TransportStatus> {
        self.inner.status_rx.clone()
    }

    /// Wait until the server has issued a session, at most `timeout`.
    pub async fn wait_for_session(&self, timeout: Duration) -> Result<SessionIdentity> {
        let mut rx = self.inner.status_rx.clone();
        let wait = async {
            let status = rx
                .wait_for(|s| s.session.is_some())
                .await
                .map_err(|_| LinkError::Closed)?;
            status
                .session
                .clone()
                .ok_or_else(|| LinkError::NotConnected("No session".to_string()))
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::NotConnected(format!(
                "No session issued within {:?} (state: {})",
                timeout,
                self.state()
            ))),
        }
    }

    /// Keys registered on the server for the current session.
    pub fn active_server_subscriptions(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<SubscriptionKey> =
            self.inner.book.lock().server_subscriptions.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Register a subscription on the current session.
    pub async fn subscribe_rpc(&self, request: &SubscriptionRequest) -> Result<SessionIdentity> {
        let key = SubscriptionKey::new(&request.event_type, request.filters.as_ref());
        let rpc = self.inner.rpc.clone();
        let session = self
            .session_rpc(request, |session, token| {
                let request = request.clone();
                async move { rpc.subscribe(&session, &token, &request).await }.boxed()
            })
            .await?;
        self.record(&session, |book| {
            book.server_subscriptions.insert(key);
        })?;
        Ok(session)
    }

    /// Remove a subscription from the current session.
    pub async fn unsubscribe_rpc(&self, request: &SubscriptionRequest) -> Result<SessionIdentity> {
        let key = SubscriptionKey::new(&request.event_type, request.filters.as_ref());
        let rpc = self.inner.rpc.clone();
        let session = self
            .session_rpc(request, |session, token| {
                let request = request.clone();
                async move { rpc.unsubscribe(&session, &token, &request).await }.boxed()
            })
            .await?;
        self.record(&session, |book| {
            book.server_subscriptions.remove(&key);
        })?;
        Ok(session)
    }

    /// Run `call` against the current session, cancelling it if the session
    /// ends before it completes.
    async fn session_rpc<F>(&self, request: &SubscriptionRequest, call: F) -> Result<SessionIdentity>
    where
        F: FnOnce(SessionIdentity, String) -> BoxFuture<'static, Result<()>>,
    {
        let status = self.status();
        let session = match (status.state, status.session) {
            (ConnectionState::Open, Some(session)) => session,
            (state, _) => {
                return Err(LinkError::NotConnected(format!(
                    "No live session for '{}' (state: {})",
                    request.event_type, state
                )))
            },
        };
        let token = self.inner.book.lock().token.clone().unwrap_or_default();

        let mut watch = self.inner.status_rx.clone();
        let generation = session.generation;
        let session_ended = async move {
            let _ = watch.wait_for(|s| s.generation != generation).await;
        };

        let rpc_timeout = self.inner.rpc_timeout;
        let call = call(session.clone(), token);
        let call = async move {
            if LinkTimeouts::is_no_timeout(rpc_timeout) {
                call.await
            } else {
                tokio::time::timeout(rpc_timeout, call)
                    .await
                    .map_err(|_| LinkError::TimeoutError(format!("RPC exceeded {:?}", rpc_timeout)))?
            }
        };

        tokio::select! {
            result = call => result.map(|()| session),
            _ = session_ended => {
                log::debug!(
                    "[skyclust-link] Session {} ended during RPC for '{}'",
                    session, request.event_type
                );
                Err(LinkError::SessionChanged)
            },
        }
    }

    fn record(&self, session: &SessionIdentity, f: impl FnOnce(&mut SessionBook)) -> Result<()> {
        let mut book = self.inner.book.lock();
        if book.generation != session.generation {
            return Err(LinkError::SessionChanged);
        }
        f(&mut book);
        Ok(())
    }
}

// ── Control task ────────────────────────────────────────────────────────────

type OpenFuture = BoxFuture<'static, Result<(ByteStream, String)>>;

struct ControlLoop {
    cmd_rx: mpsc::Receiver<TransportCmd>,
    status_tx: watch::Sender<TransportStatus>,
    event_tx: mpsc::Sender<TransportEvent>,
    book: Arc<Mutex<SessionBook>>,
    connector: Arc<dyn StreamConnector>,
    cursor_store: Arc<dyn CursorStore>,
    token_source: TokenSource,
    codec: PayloadCodec,
    policy: ReconnectPolicy,
    auto_reconnect: bool,
    timeouts: LinkTimeouts,
    /// Token used for reconnects; cleared when the server rejects it.
    token: Option<String>,
    generation: u64,
    stream: Option<ByteStream>,
    decoder: SseDecoder,
    pending_open: Option<OpenFuture>,
    /// Reply for an explicit `connect` waiting on `pending_open`.
    pending_reply: Option<oneshot::Sender<Result<()>>>,
    reconnect_at: Option<TokioInstant>,
    idle_deadline: TokioInstant,
}

impl ControlLoop {
    async fn run(mut self) {
        loop {
            let reconnect_sleep =
                tokio::time::sleep_until(self.reconnect_at.unwrap_or_else(|| TokioInstant::now() + FAR_FUTURE));
            tokio::pin!(reconnect_sleep);
            let idle_sleep = tokio::time::sleep_until(self.idle_deadline);
            tokio::pin!(idle_sleep);

            let has_stream = self.stream.is_some();
            let has_open = self.pending_open.is_some();
            let has_reconnect = self.reconnect_at.is_some();
            let idle_enabled = has_stream && !LinkTimeouts::is_no_timeout(self.timeouts.idle_timeout);

            let pending_open = &mut self.pending_open;
            let stream = &mut self.stream;

            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(TransportCmd::Connect { token, result_tx }) => {
                            self.handle_connect(token, result_tx).await;
                        },
                        Some(TransportCmd::Disconnect { result_tx }) => {
                            self.handle_disconnect().await;
                            let _ = result_tx.send(());
                        },
                        Some(TransportCmd::Shutdown) | None => {
                            self.handle_disconnect().await;
                            log::debug!("[skyclust-link] Transport control task exiting");
                            return;
                        },
                    }
                }

                opened = async {
                    match pending_open.as_mut() {
                        Some(fut) => fut.await,
                        None => std::future::pending().await,
                    }
                }, if has_open => {
                    self.pending_open = None;
                    self.handle_open_result(opened).await;
                }

                chunk = async {
                    match stream.as_mut() {
                        Some(s) => s.next().await,
                        None => std::future::pending().await,
                    }
                }, if has_stream => {
                    match chunk {
                        Some(Ok(bytes)) => self.handle_chunk(bytes).await,
                        Some(Err(e)) => {
                            log::warn!("[skyclust-link] Event stream error: {}", e);
                            self.emit(TransportEvent::Error(ConnectionError::from_link_error(&e, true))).await;
                            self.teardown(ConnectionState::Erroring, DisconnectReason::new(format!("Stream error: {}", e))).await;
                            self.schedule_reconnect().await;
                        },
                        None => {
                            log::info!("[skyclust-link] Event stream ended by server");
                            self.teardown(ConnectionState::Closing, DisconnectReason::new("Server closed the event stream")).await;
                            self.schedule_reconnect().await;
                        },
                    }
                }

                _ = &mut idle_sleep, if idle_enabled => {
                    let idle = self.timeouts.idle_timeout;
                    log::warn!("[skyclust-link] No data for {:?}, treating connection as dead", idle);
                    self.teardown(
                        ConnectionState::Erroring,
                        DisconnectReason::new(format!("Idle timeout ({:?}) - server unresponsive", idle)),
                    )
                    .await;
                    self.schedule_reconnect().await;
                }

                _ = &mut reconnect_sleep, if has_reconnect => {
                    self.reconnect_at = None;
                    if self.status_tx.borrow().state.is_open() || self.pending_open.is_some() {
                        continue;
                    }
                    log::info!(
                        "[skyclust-link] Reconnecting (attempt {})",
                        self.policy.attempt()
                    );
                    self.start_open(self.token.clone());
                }
            }
        }
    }

    fn publish(&self, f: impl FnOnce(&mut TransportStatus)) {
        self.status_tx.send_modify(f);
    }

    fn set_state(&self, state: ConnectionState) {
        self.publish(|s| s.state = state);
    }

    /// Queue `event` for the consumer, waiting while the channel is full.
    /// Resolves to `false` when the receiver is gone.
    fn emit(&self, event: TransportEvent) -> impl Future<Output = bool> + Send + 'static {
        let tx = self.event_tx.clone();
        async move {
            let delivered = tx.send(event).await.is_ok();
            if !delivered {
                log::debug!("[skyclust-link] Event receiver dropped");
            }
            delivered
        }
    }

    /// Start a new generation: drop the session and its bookkeeping.
    fn bump_generation(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        {
            let mut book = self.book.lock();
            book.generation = generation;
            book.server_subscriptions.clear();
        }
        self.publish(|s| {
            s.generation = generation;
            s.session = None;
        });
    }

    async fn handle_connect(&mut self, token: String, result_tx: oneshot::Sender<Result<()>>) {
        let (state, has_session) = {
            let status = self.status_tx.borrow();
            (status.state, status.session.is_some())
        };

        if state == ConnectionState::Open && has_session && self.token.as_deref() == Some(token.as_str()) {
            log::debug!("[skyclust-link] connect: already open with this token");
            let _ = result_tx.send(Ok(()));
            return;
        }
        if self.pending_open.is_some() || state == ConnectionState::Connecting {
            let _ = result_tx.send(Err(LinkError::ConnectInFlight));
            return;
        }

        self.reconnect_at = None;
        if self.stream.take().is_some() {
            log::info!("[skyclust-link] Replacing open stream with a new connection");
            self.decoder.finish();
            self.emit(TransportEvent::Disconnected(DisconnectReason::requested())).await;
        }
        // Reconnects reuse this token until the server rejects it.
        self.token = Some(token.clone());
        self.book.lock().token = Some(token.clone());
        self.policy.reset();
        self.publish(|s| s.reconnect_attempts = 0);
        self.pending_reply = Some(result_tx);
        self.start_open(Some(token));
    }

    async fn handle_disconnect(&mut self) {
        self.reconnect_at = None;
        self.pending_open = None;
        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(Err(LinkError::NotConnected(
                "Disconnected before the stream opened".to_string(),
            )));
        }
        let had_stream = self.stream.take().is_some();
        self.decoder.finish();
        self.policy.reset();
        self.bump_generation();
        self.publish(|s| {
            s.state = ConnectionState::Disconnected;
            s.reconnect_attempts = 0;
        });
        if had_stream {
            log::info!("[skyclust-link] Disconnected by client");
            self.emit(TransportEvent::Disconnected(DisconnectReason::requested())).await;
        }
    }

    /// Begin opening a stream. Without a token one is fetched from the
    /// token source inside the open future.
    fn start_open(&mut self, token: Option<String>) {
        let cursor = match self.cursor_store.load() {
            Ok(cursor) => cursor,
            Err(e) => {
                log::warn!("[skyclust-link] Failed to load cursor, starting without one: {}", e);
                None
            },
        };

        self.bump_generation();
        self.set_state(ConnectionState::Connecting);

        let connector = self.connector.clone();
        let source = self.token_source.clone();
        let connect_timeout = self.timeouts.connection_timeout;
        log::info!(
            "[skyclust-link] Opening event stream (generation {}, resume_from={:?})",
            self.generation,
            cursor.as_ref().map(EventCursor::as_str)
        );

        let open = async move {
            let token = match token {
                Some(token) => token,
                None => source.fetch().await?,
            };
            let stream = connector.open(&token, cursor.as_ref());
            let stream = if LinkTimeouts::is_no_timeout(connect_timeout) {
                stream.await?
            } else {
                tokio::time::timeout(connect_timeout, stream).await.map_err(|_| {
                    LinkError::TimeoutError(format!("Event stream did not open within {:?}", connect_timeout))
                })??
            };
            Ok((stream, token))
        };
        self.pending_open = Some(open.boxed());
    }

    async fn handle_open_result(&mut self, opened: Result<(ByteStream, String)>) {
        match opened {
            Ok((stream, token)) => {
                log::info!("[skyclust-link] Event stream opened, waiting for session");
                self.stream = Some(stream);
                self.decoder = SseDecoder::new();
                self.idle_deadline = TokioInstant::now() + self.idle_window();
                self.book.lock().token = Some(token.clone());
                self.token = Some(token);
                if let Some(reply) = self.pending_reply.take() {
                    let _ = reply.send(Ok(()));
                }
            },
            Err(e) => {
                let auth_failure = matches!(e, LinkError::AuthenticationError(_));
                if auth_failure {
                    log::warn!("[skyclust-link] Authentication failed while connecting: {}", e);
                    // Refetch from the token source on the next attempt.
                    self.token = None;
                    self.book.lock().token = None;
                } else {
                    log::warn!("[skyclust-link] Failed to open event stream: {}", e);
                }
                self.emit(TransportEvent::Error(ConnectionError::from_link_error(&e, true))).await;
                if let Some(reply) = self.pending_reply.take() {
                    let _ = reply.send(Err(e));
                }
                self.set_state(ConnectionState::Erroring);
                self.schedule_reconnect().await;
            },
        }
    }

    fn idle_window(&self) -> Duration {
        if LinkTimeouts::is_no_timeout(self.timeouts.idle_timeout) {
            FAR_FUTURE
        } else {
            self.timeouts.idle_timeout
        }
    }

    async fn handle_chunk(&mut self, bytes: Bytes) {
        self.idle_deadline = TokioInstant::now() + self.idle_window();

        let decoded = self.decoder.feed(&bytes);
        if decoded.comments > 0 {
            log::trace!("[skyclust-link] {} heartbeat comment(s)", decoded.comments);
        }
        if decoded.overflowed {
            self.emit(TransportEvent::Error(
                ConnectionError::new("Oversized event discarded", true).with_kind(ConnectionErrorKind::Decode),
            ))
            .await;
        }
        for frame in decoded.frames {
            self.handle_frame(frame).await;
        }
    }

    async fn handle_frame(&mut self, frame: RawFrame) {
        if let Some(retry_ms) = frame.retry_ms {
            log::debug!("[skyclust-link] Server advised retry interval {}ms", retry_ms);
            self.policy.set_server_advised(Duration::from_millis(retry_ms));
        }

        if frame.is_connected_event() {
            self.handle_connected(&frame).await;
            return;
        }
        if !frame.has_data() {
            return;
        }

        let data = match self.codec.decode_frame(&frame) {
            Ok(data) => data,
            Err(e) => {
                log::warn!(
                    "[skyclust-link] Dropping undecodable '{}' event (id={:?}): {}",
                    frame.event,
                    frame.id,
                    e
                );
                self.emit(TransportEvent::Error(ConnectionError::from_link_error(&e, true))).await;
                return;
            },
        };

        let cursor = frame.cursor();
        let event = StreamEvent::new(frame.event, cursor, data);
        self.emit(TransportEvent::Event(event)).await;
    }

    async fn handle_connected(&mut self, frame: &RawFrame) {
        let info = self
            .codec
            .decode_frame(frame)
            .and_then(|value| serde_json::from_value::<ConnectedInfo>(value).map_err(LinkError::from));
        let info = match info {
            Ok(info) if !info.connection_id.is_empty() => info,
            Ok(_) => {
                log::warn!("[skyclust-link] 'connected' event without connection_id");
                return;
            },
            Err(e) => {
                log::warn!("[skyclust-link] Malformed 'connected' event: {}", e);
                self.emit(TransportEvent::Error(ConnectionError::from_link_error(&e, true))).await;
                return;
            },
        };

        let session = SessionIdentity::new(info.connection_id.clone(), self.generation);
        log::info!("[skyclust-link] Session established: {}", session);
        self.policy.reset();
        self.publish(|s| {
            s.state = ConnectionState::Open;
            s.session = Some(session);
            s.reconnect_attempts = 0;
        });
        self.emit(TransportEvent::Connected(info)).await;
    }

    /// Drop the stream and session after an unexpected close.
    async fn teardown(&mut self, state: ConnectionState, reason: DisconnectReason) {
        self.stream = None;
        if self.decoder.finish() {
            log::debug!("[skyclust-link] Dropped unterminated trailing SSE block");
        }
        self.bump_generation();
        self.set_state(state);
        self.emit(TransportEvent::Disconnected(reason)).await;
    }

    async fn schedule_reconnect(&mut self) {
        match self.policy.next_delay() {
            Some(delay) => {
                let attempt = self.policy.attempt();
                log::info!(
                    "[skyclust-link] Attempting reconnection in {}ms (attempt {})",
                    delay.as_millis(),
                    attempt
                );
                self.reconnect_at = Some(TokioInstant::now() + delay);
                self.publish(|s| {
                    s.state = ConnectionState::Reconnecting;
                    s.reconnect_attempts = attempt;
                });
            },
            None => {
                let error = if self.auto_reconnect {
                    let max = self.policy.max_attempts().unwrap_or_default();
                    log::warn!("[skyclust-link] Max reconnection attempts ({}) reached", max);
                    ConnectionError::from_link_error(&LinkError::ReconnectExhausted(max), false)
                } else {
                    log::warn!("[skyclust-link] Connection lost and auto-reconnect is disabled");
                    ConnectionError::new("Connection lost and auto-reconnect is disabled", false)
                        .with_kind(ConnectionErrorKind::Network)
                };
                self.reconnect_at = None;
                self.set_state(ConnectionState::Disconnected);
                self.emit(TransportEvent::Error(error)).await;
            },
        }
    }
}
