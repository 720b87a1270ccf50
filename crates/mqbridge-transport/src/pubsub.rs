//! Cloud Pub/Sub client abstraction
//!
//! [`Subscriber`] yields push deliveries one at a time; each [`Delivery`]
//! carries its own acknowledgment handle. [`Publisher`] publishes an
//! envelope and resolves to the service-assigned message id.

use async_trait::async_trait;
use mqbridge_core::{CloudMessage, PublishEnvelope, Result};

/// Publishes to cloud topics
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    /// Publish and wait for the delivery identifier
    async fn publish(&self, topic: &str, envelope: PublishEnvelope) -> Result<String>;

    /// Flush and release publisher resources
    async fn shutdown(&self) {}
}

/// Receives messages from one subscription
#[async_trait]
pub trait Subscriber: Send + 'static {
    /// Next delivered message, or `None` once the subscription is closed
    async fn next_delivery(&mut self) -> Result<Option<Delivery>>;
}

/// Settles a single delivery with the service
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(self: Box<Self>) -> Result<()>;
    async fn nack(self: Box<Self>) -> Result<()>;
}

/// A received message awaiting acknowledgment
pub struct Delivery {
    pub message: CloudMessage,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(message: CloudMessage, acker: Box<dyn Acknowledger>) -> Self {
        Self { message, acker }
    }

    /// Acknowledge receipt; the service will not redeliver
    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    /// Negative-acknowledge; the service may redeliver
    pub async fn nack(self) -> Result<()> {
        self.acker.nack().await
    }

    /// Split into the message and its acknowledgment handle
    pub fn into_parts(self) -> (CloudMessage, Box<dyn Acknowledger>) {
        (self.message, self.acker)
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}
