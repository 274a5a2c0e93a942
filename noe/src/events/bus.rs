//! Event Bus - typed per-topic pub/sub between subsystems
//!
//! One tokio broadcast channel per topic. The ring buffer gives the required
//! backpressure policy for free: a slow subscriber loses the oldest events
//! it has not consumed (counted per topic), and the publisher never blocks.
//! Within a topic, every subscriber sees events in publish order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{CognitiveEvent, Topic};

/// Default per-topic ring capacity (events)
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// Central event bus. The only inter-component communication channel.
pub struct EventBus {
    channels: HashMap<Topic, broadcast::Sender<CognitiveEvent>>,
    drops: HashMap<Topic, Arc<AtomicU64>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus with the given per-topic ring capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let mut channels = HashMap::new();
        let mut drops = HashMap::new();
        for topic in Topic::ALL {
            let (tx, _) = broadcast::channel(capacity.max(1));
            channels.insert(topic, tx);
            drops.insert(topic, Arc::new(AtomicU64::new(0)));
        }
        Self {
            channels,
            drops,
            capacity,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }

    /// Publish an event to its topic. Non-blocking and fire-and-forget: no
    /// subscribers is fine, and a full subscriber ring sheds its oldest
    /// entries rather than slowing the publisher down.
    pub fn publish(&self, event: CognitiveEvent) {
        debug!(topic = %event.kind, event_id = %event.id, "EventBus::publish");
        if let Some(tx) = self.channels.get(&event.kind) {
            let _ = tx.send(event);
        }
    }

    /// Subscribe to a topic. Events published before subscription are not
    /// delivered. Cancellation is dropping the subscription (idempotent).
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        debug!(%topic, "EventBus::subscribe: new subscriber");
        Subscription {
            topic,
            rx: self.channels[&topic].subscribe(),
            drops: Arc::clone(&self.drops[&topic]),
        }
    }

    /// Subscribe with a handler closure run on its own task. Returns a
    /// handle whose `cancel` is immediate and idempotent.
    pub fn subscribe_with<F>(&self, topic: Topic, mut handler: F) -> SubscriptionHandle
    where
        F: FnMut(CognitiveEvent) + Send + 'static,
    {
        debug!(%topic, "EventBus::subscribe_with: spawning handler task");
        let mut sub = self.subscribe(topic);
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn({
            let cancelled = Arc::clone(&cancelled);
            async move {
                while let Some(event) = sub.recv().await {
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }
                    handler(event);
                }
            }
        });
        SubscriptionHandle { task, cancelled }
    }

    /// Events dropped so far for lagging subscribers of this topic
    pub fn drop_count(&self, topic: Topic) -> u64 {
        self.drops[&topic].load(Ordering::Relaxed)
    }

    /// Total drops across all topics
    pub fn total_drops(&self) -> u64 {
        Topic::ALL.iter().map(|t| self.drop_count(*t)).sum()
    }

    /// Events currently buffered in the topic ring
    pub fn queue_depth(&self, topic: Topic) -> usize {
        self.channels[&topic].len()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.channels[&topic].receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// A live subscription to one topic
pub struct Subscription {
    topic: Topic,
    rx: broadcast::Receiver<CognitiveEvent>,
    drops: Arc<AtomicU64>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Receive the next event, skipping over any lagged gap (the gap size is
    /// added to the topic drop counter). Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<CognitiveEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(topic = %self.topic, missed = n, "Subscription::recv: lagged");
                    self.drops.fetch_add(n, Ordering::Relaxed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` when empty or closed
    pub fn try_recv(&mut self) -> Option<CognitiveEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.drops.fetch_add(n, Ordering::Relaxed);
                }
                Err(_) => return None,
            }
        }
    }
}

/// Handle for a handler-task subscription
pub struct SubscriptionHandle {
    task: tokio::task::JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Cancel the handler task. Safe to call more than once.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("SubscriptionHandle::cancel: aborting handler task");
        }
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Create a bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}
