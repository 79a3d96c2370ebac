//! Event Bus
//!
//! Every event from every session is published here, tagged with its session
//! id. Order is preserved per session; events of different sessions may
//! interleave arbitrarily. Publishing never blocks: a subscriber that falls
//! more than the bus capacity behind loses the oldest events and is told so.

use futures::Stream;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::types::events::SessionEvent;

/// Receives every event published on the bus
pub trait EventSink: Send + Sync + 'static {
    /// Called once per event, in per-session order
    fn on_event(&self, event: &SessionEvent);
}

impl<F> EventSink for F
where
    F: Fn(&SessionEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event);
    }
}

/// Broadcast fan-out of session events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish one event; events with no subscriber are discarded
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Events published from now on as a stream
    ///
    /// Lagging is logged and skipped; the stream ends when the bus is dropped.
    pub fn stream(&self) -> impl Stream<Item = SessionEvent> + Send + 'static {
        let mut rx = self.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("event subscriber lagged, {skipped} event(s) skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Deliver every event to `sink` from a background task
    pub fn forward_to(&self, sink: Arc<dyn EventSink>) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => sink.on_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("event sink lagged, {skipped} event(s) skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
