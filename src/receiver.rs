//! Consumer end of the transport's event channel.
//!
//! An event counts as processed once its consumer asks for the next one (or
//! calls [`EventReceiver::commit`]). Only processed cursors reach the
//! [`CursorStore`], so a crash never skips an event that was buffered but not
//! yet handled; the server replays it on resume instead.
//!
//! Writes are coalesced: the processed cursor is saved when the channel runs
//! dry, every [`COMMIT_BATCH`] events during a burst, and when the channel
//! closes. Saves run on the blocking pool.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::cursor::EventCursor;
use crate::cursor_store::CursorStore;
use crate::error::{LinkError, Result};
use crate::event_handlers::TransportEvent;

/// Processed events allowed to pile up before a save is forced.
pub const COMMIT_BATCH: usize = 64;

/// Receiving end of the transport's multiplexed event channel.
pub struct EventReceiver {
    rx: mpsc::Receiver<TransportEvent>,
    store: Arc<dyn CursorStore>,
    /// Cursor of the event most recently handed out; not processed yet.
    in_flight: Option<EventCursor>,
    /// Latest processed cursor not yet written.
    uncommitted: Option<EventCursor>,
    uncommitted_events: usize,
}

impl std::fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver")
            .field("in_flight", &self.in_flight)
            .field("uncommitted", &self.uncommitted)
            .finish()
    }
}

impl EventReceiver {
    pub(crate) fn new(rx: mpsc::Receiver<TransportEvent>, store: Arc<dyn CursorStore>) -> Self {
        Self {
            rx,
            store,
            in_flight: None,
            uncommitted: None,
            uncommitted_events: 0,
        }
    }

    /// Next event, in receive order. `None` once the transport has shut down.
    ///
    /// Marks the previously returned event as processed.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.mark_processed();
        let event = match self.rx.try_recv() {
            Ok(event) => {
                if self.uncommitted_events >= COMMIT_BATCH {
                    self.commit_logged().await;
                }
                Some(event)
            },
            Err(TryRecvError::Empty) => {
                self.commit_logged().await;
                self.rx.recv().await
            },
            Err(TryRecvError::Disconnected) => {
                self.commit_logged().await;
                None
            },
        };
        self.track(event.as_ref());
        event
    }

    /// Non-blocking variant of [`recv`](Self::recv). Never writes; the
    /// processed cursor is saved by the next `recv` or `commit`.
    pub fn try_recv(&mut self) -> std::result::Result<TransportEvent, TryRecvError> {
        self.mark_processed();
        let event = self.rx.try_recv()?;
        self.track(Some(&event));
        Ok(event)
    }

    /// Treat every event handed out so far as processed and save the latest
    /// cursor among them.
    pub async fn commit(&mut self) -> Result<()> {
        self.mark_processed();
        let Some(cursor) = self.uncommitted.clone() else {
            return Ok(());
        };
        let store = self.store.clone();
        let saving = cursor.clone();
        tokio::task::spawn_blocking(move || store.save(&saving))
            .await
            .map_err(|e| LinkError::CursorStoreError(format!("cursor save task failed: {}", e)))??;

        log::trace!("[skyclust-link] Committed cursor {}", cursor);
        self.uncommitted = None;
        self.uncommitted_events = 0;
        Ok(())
    }

    /// Latest processed cursor not yet saved.
    pub fn uncommitted(&self) -> Option<&EventCursor> {
        self.uncommitted.as_ref()
    }

    async fn commit_logged(&mut self) {
        if let Err(e) = self.commit().await {
            log::warn!("[skyclust-link] Failed to persist cursor: {}", e);
        }
    }

    fn mark_processed(&mut self) {
        if let Some(cursor) = self.in_flight.take() {
            self.uncommitted = Some(cursor);
            self.uncommitted_events += 1;
        }
    }

    fn track(&mut self, event: Option<&TransportEvent>) {
        if let Some(TransportEvent::Event(ev)) = event {
            self.in_flight = ev.cursor.clone();
        }
    }
}
