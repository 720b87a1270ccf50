//! Google Cloud Pub/Sub backend
//!
//! Credentials come from the environment
//! (`GOOGLE_APPLICATION_CREDENTIALS` or the metadata server).

use crate::pubsub::{Acknowledger, Delivery, Publisher, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::publisher::Publisher as TopicPublisher;
use google_cloud_pubsub::subscriber::ReceivedMessage;
use google_cloud_pubsub::subscription::MessageStream;
use mqbridge_core::{BridgeError, CloudMessage, PublishEnvelope, Result};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

fn pubsub_error(err: impl std::fmt::Display) -> BridgeError {
    BridgeError::PubSub(err.to_string())
}

/// Authenticated Pub/Sub client
#[derive(Clone)]
pub struct GcpPubSub {
    client: Client,
}

impl GcpPubSub {
    pub async fn connect() -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(pubsub_error)?;
        let client = Client::new(config).await.map_err(pubsub_error)?;
        info!("Connected to Google Cloud Pub/Sub");
        Ok(Self { client })
    }

    pub fn publisher(&self) -> GcpPublisher {
        GcpPublisher {
            client: self.client.clone(),
            publishers: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscriber(&self, subscription: &str) -> GcpSubscriber {
        GcpSubscriber {
            client: self.client.clone(),
            subscription: subscription.to_string(),
            stream: None,
        }
    }
}

/// Publishes through one cached publisher per topic
pub struct GcpPublisher {
    client: Client,
    publishers: Mutex<HashMap<String, TopicPublisher>>,
}

#[async_trait]
impl Publisher for GcpPublisher {
    async fn publish(&self, topic: &str, envelope: PublishEnvelope) -> Result<String> {
        let publisher = {
            let mut publishers = self.publishers.lock().await;
            publishers
                .entry(topic.to_string())
                .or_insert_with(|| self.client.topic(topic).new_publisher(None))
                .clone()
        };

        let message = PubsubMessage {
            data: envelope.data,
            attributes: envelope.attributes,
            ..Default::default()
        };
        let awaiter = publisher.publish(message).await;
        awaiter.get().await.map_err(pubsub_error)
    }

    async fn shutdown(&self) {
        let mut publishers = self.publishers.lock().await;
        for (topic, mut publisher) in publishers.drain() {
            debug!(topic = %topic, "Shutting down publisher");
            publisher.shutdown().await;
        }
    }
}

/// Streams deliveries from one subscription
pub struct GcpSubscriber {
    client: Client,
    subscription: String,
    stream: Option<MessageStream>,
}

#[async_trait]
impl Subscriber for GcpSubscriber {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>> {
        if self.stream.is_none() {
            let stream = self
                .client
                .subscription(&self.subscription)
                .subscribe(None)
                .await
                .map_err(pubsub_error)?;
            info!("Listening on subscription {}", self.subscription);
            self.stream = Some(stream);
        }

        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        Ok(stream.next().await.map(|received| {
            let message = CloudMessage {
                id: received.message.message_id.clone(),
                data: received.message.data.clone(),
                attributes: received.message.attributes.clone(),
            };
            Delivery::new(message, Box::new(GcpAck(received)))
        }))
    }
}

struct GcpAck(ReceivedMessage);

#[async_trait]
impl Acknowledger for GcpAck {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.0.ack().await.map_err(pubsub_error)
    }

    async fn nack(self: Box<Self>) -> Result<()> {
        self.0.nack().await.map_err(pubsub_error)
    }
}
