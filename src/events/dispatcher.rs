//! Channel-backed event dispatcher.
//!
//! Events are enqueued with non-blocking `try_send`; when the buffer is
//! full the event is dropped and counted rather than stalling a query.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;

use super::{EventDispatcher, QueryEvent};

/// Buffers events in a bounded channel for one or more [`QueryEventStream`]s.
#[derive(Debug)]
pub struct ChannelDispatcher {
    tx: Sender<QueryEvent>,
    rx: Receiver<QueryEvent>,
    dropped_events: AtomicU64,
}

impl ChannelDispatcher {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Opens a stream over the buffered events.
    ///
    /// Streams share one queue: each event is delivered to exactly one of them.
    #[must_use]
    pub fn stream(&self) -> QueryEventStream {
        QueryEventStream {
            rx: self.rx.clone(),
        }
    }

    /// Number of events dropped because the buffer was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl EventDispatcher for ChannelDispatcher {
    fn dispatch(&self, event: QueryEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event) | TrySendError::Disconnected(event)) => {
                let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(query_id = %event.query_id(), dropped, "event buffer full, dropping query event");
            }
        }
    }
}

/// Reads events buffered by a [`ChannelDispatcher`].
#[derive(Debug, Clone)]
pub struct QueryEventStream {
    rx: Receiver<QueryEvent>,
}

impl QueryEventStream {
    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<QueryEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Takes every event buffered right now, without blocking.
    pub fn drain(&self) -> Vec<QueryEvent> {
        self.rx.try_iter().collect()
    }
}
