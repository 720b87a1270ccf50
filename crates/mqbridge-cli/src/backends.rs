//! Concrete clients for the binary
//!
//! No vendor MQ client is linked, so the only queue manager available is the
//! in-process emulator, and only when asked for with `--emulate-mq`. It holds
//! nothing but the messages put during this run. Pub/Sub goes to Google
//! Cloud when built with the `gcp` feature and to a private in-process
//! service otherwise.

use anyhow::{Result, bail};
use mqbridge_core::Destination;
use mqbridge_transport::InMemoryQueueManager;
use tracing::warn;

/// Queue manager with the bridge's queues defined
pub fn queue_manager(name: &str, objects: &[&Destination], emulate: bool) -> Result<InMemoryQueueManager> {
    if !emulate {
        bail!(
            "No native MQ client is linked into this build; pass --emulate-mq to run against an empty in-process queue manager"
        );
    }
    warn!("Using in-process queue manager {}; nothing reaches a real queue manager", name);
    let qm = InMemoryQueueManager::new(name);
    for object in objects {
        if let Destination::Queue(queue) = object {
            qm.define_queue(queue.as_str());
        }
    }
    Ok(qm)
}

#[cfg(feature = "gcp")]
pub async fn subscriber(subscription: &str) -> Result<mqbridge_transport::gcp::GcpSubscriber> {
    let pubsub = mqbridge_transport::gcp::GcpPubSub::connect().await?;
    Ok(pubsub.subscriber(subscription))
}

#[cfg(feature = "gcp")]
pub async fn publisher(_topic: &str) -> Result<mqbridge_transport::gcp::GcpPublisher> {
    let pubsub = mqbridge_transport::gcp::GcpPubSub::connect().await?;
    Ok(pubsub.publisher())
}

#[cfg(not(feature = "gcp"))]
pub async fn subscriber(
    subscription: &str,
) -> Result<mqbridge_transport::memory::InMemorySubscriber> {
    warn!("Built without the gcp feature; listening on an in-process subscription");
    let pubsub = mqbridge_transport::InMemoryPubSub::new();
    pubsub.create_subscription(subscription, subscription);
    Ok(pubsub.subscriber(subscription)?)
}

#[cfg(not(feature = "gcp"))]
pub async fn publisher(topic: &str) -> Result<mqbridge_transport::InMemoryPubSub> {
    warn!("Built without the gcp feature; publishing to an in-process topic");
    let pubsub = mqbridge_transport::InMemoryPubSub::new();
    pubsub.create_topic(topic);
    Ok(pubsub)
}
