//! Queue-manager client abstraction
//!
//! Mirrors the MQI verbs the bridge needs. The vendor client sits behind
//! [`QueueManagerClient`] and [`MqConnection`]; handle ownership encodes
//! the release rules:
//! - [`ObjectHandle`] is neither `Clone` nor `Copy`, and `close` consumes it
//! - `disconnect` consumes the connection, so no handle outlives it

use async_trait::async_trait;
use mqbridge_core::{
    ConnectOptions, Destination, GetOptions, MessageFormat, MessageId, MqMessage, OpenOptions,
    PutOptions, ReasonCode, Result, SubscriptionOptions,
};
use std::fmt;

/// Factory for queue-manager connections (MQCONNX)
#[async_trait]
pub trait QueueManagerClient: Send + Sync + 'static {
    type Connection: MqConnection;

    /// Connect to the named queue manager
    async fn connect(&self, queue_manager: &str, options: &ConnectOptions)
    -> Result<Self::Connection>;
}

/// An open queue-manager connection (HCONN)
#[async_trait]
pub trait MqConnection: Send {
    /// Open a queue or topic (MQOPEN)
    async fn open(&mut self, destination: &Destination, options: OpenOptions)
    -> Result<ObjectHandle>;

    /// Subscribe to a topic (MQSUB). With a managed subscription the queue
    /// manager also hands back the queue to get publications from.
    async fn subscribe(
        &mut self,
        topic: &str,
        options: &SubscriptionOptions,
    ) -> Result<SubscriptionHandles>;

    /// Put one message (MQPUT)
    async fn put(
        &mut self,
        object: &ObjectHandle,
        payload: &[u8],
        format: &MessageFormat,
        options: &PutOptions,
    ) -> Result<PutReceipt>;

    /// Get one message, waiting up to the configured interval (MQGET)
    async fn get(&mut self, object: &ObjectHandle, options: &GetOptions) -> Result<MqMessage>;

    /// Release an object handle (MQCLOSE)
    async fn close(&mut self, object: ObjectHandle) -> Result<()>;

    /// Release the connection (MQDISC)
    async fn disconnect(self) -> Result<()>;
}

/// Open object handle (HOBJ)
#[derive(PartialEq, Eq)]
pub struct ObjectHandle {
    id: u64,
    name: String,
}

impl ObjectHandle {
    /// Backends mint handles; the bridge only passes them back
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Object name or topic string the handle was opened for
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({}, {})", self.id, self.name)
    }
}

/// Handles returned by a managed subscription
#[derive(Debug)]
pub struct SubscriptionHandles {
    /// Managed queue publications arrive on
    pub queue: ObjectHandle,
    /// The subscription itself
    pub subscription: ObjectHandle,
}

/// Result of a successful put
#[derive(Debug, Clone, PartialEq)]
pub struct PutReceipt {
    /// Message id assigned by the queue manager
    pub msg_id: MessageId,
    /// Set when the put completed with MQCC_WARNING
    pub warning: Option<ReasonCode>,
}
