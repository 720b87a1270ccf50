//! Sink adapters
//!
//! [`MqSink`] runs one full MQI sequence per message:
//! connect, open for output, put, close, disconnect. Every step that can run
//! does run, so a failed put still releases its handle and connection.
//! [`PubSubSink`] publishes to a fixed cloud topic.

use mqbridge_core::{
    CloudMessage, ConnectOptions, Destination, MessageFormat, MqMessage, OpenOptions, PutOptions,
    Result, publish_envelope, queue_envelope, reason_codes,
};
use mqbridge_transport::{MqConnection, PutReceipt, Publisher, QueueManagerClient};
use tracing::{debug, error, info, warn};

/// Puts messages to a queue-manager queue or topic
pub struct MqSink<C: QueueManagerClient> {
    client: C,
    queue_manager: String,
    connect: ConnectOptions,
    destination: Destination,
}

impl<C: QueueManagerClient> MqSink<C> {
    pub fn new(
        client: C,
        queue_manager: impl Into<String>,
        connect: ConnectOptions,
        destination: Destination,
    ) -> Self {
        Self {
            client,
            queue_manager: queue_manager.into(),
            connect,
            destination,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Wrap a cloud message in the queue envelope and put it
    pub async fn forward(&self, message: &CloudMessage) -> Result<PutReceipt> {
        let payload = queue_envelope(message);
        debug!("Envelope for {}: {:?}", message.id, payload);

        let receipt = self.deliver(payload.as_bytes()).await?;
        info!("MQ MsgId: {} / GCP Id: {}", receipt.msg_id, message.id);
        Ok(receipt)
    }

    /// Put one payload, connecting and disconnecting around it
    pub async fn deliver(&self, payload: &[u8]) -> Result<PutReceipt> {
        let mut conn = match self.client.connect(&self.queue_manager, &self.connect).await {
            Ok(conn) => {
                info!("MQCONN to {} successful", self.queue_manager);
                conn
            }
            Err(e) => {
                error!("{}", e);
                return Err(e);
            }
        };

        let result = self.open_and_put(&mut conn, payload).await;

        match conn.disconnect().await {
            Ok(()) => info!("MQDISC successful"),
            Err(e) => warn!("{}", e),
        }
        result
    }

    async fn open_and_put(&self, conn: &mut C::Connection, payload: &[u8]) -> Result<PutReceipt> {
        let object = match conn.open(&self.destination, OpenOptions::Output).await {
            Ok(object) => {
                info!("MQOPEN of {} successful", self.destination.name());
                object
            }
            Err(e) => {
                error!("{}", e);
                return Err(e);
            }
        };

        let options = PutOptions::for_destination(&self.destination);
        let result = conn
            .put(&object, payload, &MessageFormat::String, &options)
            .await;
        match &result {
            Ok(PutReceipt {
                warning: Some(reason),
                ..
            }) if *reason == reason_codes::NO_SUBS_MATCHED => {
                warn!("MQPUT to {} matched no subscribers [{}]", self.destination, reason);
            }
            Ok(PutReceipt {
                warning: Some(reason),
                ..
            }) => warn!("MQPUT completed with warning [{}]", reason),
            Ok(_) => info!("MQPUT successful"),
            Err(e) => error!("{}", e),
        }

        match conn.close(object).await {
            Ok(()) => info!("MQCLOSE successful"),
            Err(e) => warn!("{}", e),
        }
        result
    }
}

/// Publishes MQ messages to one cloud topic
pub struct PubSubSink<P: Publisher> {
    publisher: P,
    topic: String,
}

impl<P: Publisher> PubSubSink<P> {
    pub fn new(publisher: P, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish and return the service-assigned id
    pub async fn forward(&self, message: &MqMessage) -> Result<String> {
        let envelope = publish_envelope(message)?;
        debug!("Publishing {} bytes to {}", envelope.data.len(), self.topic);

        match self.publisher.publish(&self.topic, envelope).await {
            Ok(id) => {
                info!("Message {} published.", id);
                Ok(id)
            }
            Err(e) => {
                error!("{}", e);
                Err(e)
            }
        }
    }

    pub async fn shutdown(&self) {
        self.publisher.shutdown().await;
    }
}
