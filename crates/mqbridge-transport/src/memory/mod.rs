//! In-process backends for both sides of the bridge

pub mod pubsub;
pub mod queue_manager;

pub use pubsub::{InMemoryPubSub, InMemorySubscriber, PublishedMessage};
pub use queue_manager::{InMemoryConnection, InMemoryQueueManager, MqCall};
