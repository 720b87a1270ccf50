//! # mqbridge-core
//!
//! Core types shared by every bridge direction.
//!
//! This crate provides:
//! - Message types for both sides (Pub/Sub and MQ)
//! - The envelope transform and hex message-id helpers
//! - Connection descriptors and MQI call options
//! - Error types and MQ reason codes

pub mod envelope;
pub mod error;
pub mod message;
pub mod options;

pub use envelope::{PublishEnvelope, from_hex, publish_envelope, queue_envelope, to_hex};
pub use error::{
    BridgeError, CompletionCode, ErrorCategory, MqOp, ReasonCode, Result, reason_codes,
};
pub use message::{CloudMessage, MessageFormat, MessageId, MqMessage};
pub use options::{
    Binding, ClientAuth, ClientConnection, ConnectOptions, Credentials, Destination, GetOptions,
    OpenOptions, PutOptions, SubscriptionOptions, TlsOptions,
};
