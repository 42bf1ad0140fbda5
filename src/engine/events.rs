//! Engine event fan-out.
//!
//! Events are broadcast over a bounded channel; every subscriber sees them in
//! emission order, and a subscriber that falls more than the channel capacity
//! behind loses the oldest events rather than stalling the engine.

use crate::models::{Instrument, Side};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Engine lifecycle events delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    OrderCreated {
        order_id: u64,
    },
    OrderCancelled {
        order_id: u64,
    },
    OrderClosed {
        order_id: u64,
    },
    OrderBookUpdated {
        instrument: Instrument,
        side: Side,
        price: Decimal,
    },
}

/// Event discriminant used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    OrderCreated,
    OrderCancelled,
    OrderClosed,
    OrderBookUpdated,
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::OrderCreated { .. } => EventKind::OrderCreated,
            EngineEvent::OrderCancelled { .. } => EventKind::OrderCancelled,
            EngineEvent::OrderClosed { .. } => EventKind::OrderClosed,
            EngineEvent::OrderBookUpdated { .. } => EventKind::OrderBookUpdated,
        }
    }
}

/// Bounded fan-out channel for engine events.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Deliver an event to every live subscriber. Never blocks beyond the
    /// enqueue; with no subscribers the event is dropped.
    pub fn emit(&self, event: EngineEvent) {
        debug!(?event, "engine event");
        let _ = self.sender.send(event);
    }

    /// Raw receiver over the full event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Spawn a dispatcher that invokes `handler` for every event of `kind`.
    /// A lagging subscriber skips the overwritten events and keeps going.
    pub fn subscribe_with<F>(&self, kind: EventKind, mut handler: F) -> Subscription
    where
        F: FnMut(EngineEvent) + Send + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.kind() == kind => handler(event),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscriber lagged, dropping oldest events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription { handle }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Handle to a running event dispatcher.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivery. Events not yet handled are dropped.
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_events_arrive_in_emission_order() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        bus.emit(EngineEvent::OrderCreated { order_id: 1 });
        bus.emit(EngineEvent::OrderClosed { order_id: 1 });

        assert_eq!(receiver.recv().await.unwrap(), EngineEvent::OrderCreated { order_id: 1 });
        assert_eq!(receiver.recv().await.unwrap(), EngineEvent::OrderClosed { order_id: 1 });
    }

    #[tokio::test]
    async fn test_subscribe_with_filters_by_kind() {
        let bus = EventBus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let subscription = bus.subscribe_with(EventKind::OrderClosed, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(EngineEvent::OrderCreated { order_id: 7 });
        bus.emit(EngineEvent::OrderClosed { order_id: 7 });
        bus.emit(EngineEvent::OrderCancelled { order_id: 8 });
        bus.emit(EngineEvent::OrderClosed { order_id: 8 });

        // Let the dispatcher task drain the channel.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        subscription.stop();
    }

    #[tokio::test]
    async fn test_stopped_subscription_receives_nothing() {
        let bus = EventBus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let subscription = bus.subscribe_with(EventKind::OrderCreated, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscription.stop();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        bus.emit(EngineEvent::OrderCreated { order_id: 1 });
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit(EngineEvent::OrderCreated { order_id: 1 });
    }
}
