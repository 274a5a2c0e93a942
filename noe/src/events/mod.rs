//! Event system - the bus every subsystem speaks through
//!
//! Components publish typed `CognitiveEvent`s to per-topic channels; the
//! clock, engines, wake machine, stream and integrator never hold references
//! to each other, only to the bus. Delivery is ordered per topic, bounded
//! per subscriber, and never blocks the publisher.

mod bus;
mod logger;
mod types;

pub use bus::{
    create_event_bus, EventBus, Subscription, SubscriptionHandle, DEFAULT_TOPIC_CAPACITY,
};
pub use logger::{read_event_log, spawn_event_logger};
pub use types::{CognitiveEvent, EventLogEntry, Topic};
