//! Client abstractions for both ends of the bridge
//!
//! This crate provides:
//! - Queue-manager traits (QueueManagerClient/MqConnection) over the MQI verbs
//! - Pub/Sub traits (Publisher/Subscriber) with per-delivery acknowledgment
//! - In-memory backends for both, used by tests and local runs
//! - A Google Cloud Pub/Sub backend behind the `gcp` feature

pub mod memory;
pub mod pubsub;
pub mod queue_manager;
#[cfg(feature = "gcp")]
pub mod gcp;

pub use memory::{InMemoryPubSub, InMemoryQueueManager};
pub use pubsub::{Acknowledger, Delivery, Publisher, Subscriber};
pub use queue_manager::{
    MqConnection, ObjectHandle, PutReceipt, QueueManagerClient, SubscriptionHandles,
};
