//! Messages as seen by either side of the bridge

use crate::envelope::{from_hex, to_hex};
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Message received from a cloud Pub/Sub subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudMessage {
    /// Identifier assigned by the Pub/Sub service
    pub id: String,
    /// Payload bytes
    pub data: Vec<u8>,
    /// Message attributes
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl CloudMessage {
    pub fn new(id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Length of an MQ message or correlation identifier
pub const MESSAGE_ID_LEN: usize = 24;

/// 24-byte MQ message (or correlation) identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub [u8; MESSAGE_ID_LEN]);

impl MessageId {
    /// MQMI_NONE: all zero bytes
    pub const NONE: MessageId = MessageId([0; MESSAGE_ID_LEN]);

    /// Lowercase hex rendering, two digits per byte
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }

    /// Parse a hex string. Shorter ids are zero-padded on the right, as MQ does.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = from_hex(hex)?;
        if bytes.len() > MESSAGE_ID_LEN {
            return Err(BridgeError::InvalidMessageId(format!(
                "{} bytes, at most {} allowed",
                bytes.len(),
                MESSAGE_ID_LEN
            )));
        }
        let mut id = [0u8; MESSAGE_ID_LEN];
        id[..bytes.len()].copy_from_slice(&bytes);
        Ok(MessageId(id))
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.to_hex())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// MQMD format name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFormat {
    /// MQFMT_NONE (blank)
    None,
    /// MQFMT_STRING ("MQSTR")
    String,
    /// Any other 8-character format name
    Other(String),
}

impl MessageFormat {
    /// Parse an MQMD format field, ignoring the space padding
    pub fn parse(raw: &str) -> Self {
        match raw.trim_end() {
            "" => MessageFormat::None,
            "MQSTR" => MessageFormat::String,
            other => MessageFormat::Other(other.to_string()),
        }
    }

    /// Padded 8-character form as stored in the MQMD
    pub fn as_field(&self) -> String {
        let name = match self {
            MessageFormat::None => "",
            MessageFormat::String => "MQSTR",
            MessageFormat::Other(name) => name.as_str(),
        };
        format!("{:<8}", name)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, MessageFormat::String)
    }
}

/// Message read from a queue-manager queue or subscription
#[derive(Debug, Clone, PartialEq)]
pub struct MqMessage {
    pub msg_id: MessageId,
    pub correl_id: MessageId,
    pub format: MessageFormat,
    pub data: Vec<u8>,
}

impl MqMessage {
    /// Payload as text (lossy UTF-8)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
