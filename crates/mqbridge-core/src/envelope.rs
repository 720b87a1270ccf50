//! Envelope transform
//!
//! Messages crossing the bridge are wrapped so the receiving side can trace
//! them back to their origin:
//! - Into MQ: a small text header carrying the Pub/Sub message id
//! - Into Pub/Sub: the JSON-encoded payload plus `origin`/`msgId` attributes
//!
//! Everything here is pure and stateless.

use crate::error::{BridgeError, Result};
use crate::message::{CloudMessage, MqMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute naming the system a published message came from
pub const ORIGIN_ATTRIBUTE: &str = "origin";
/// Value of [`ORIGIN_ATTRIBUTE`] for messages read from MQ
pub const ORIGIN_IBM_MQ: &str = "ibm-mq";
/// Attribute carrying the hex MQ message id
pub const MSG_ID_ATTRIBUTE: &str = "msgId";

const CR: char = '\r';

/// Build the text put to MQ for a Pub/Sub message.
///
/// Format: `"googleID": <id>\r"Content": {\r<payload>}`
pub fn queue_envelope(message: &CloudMessage) -> String {
    let payload = String::from_utf8_lossy(&message.data);
    format!(
        "\"googleID\": {}{CR}\"Content\": {{{CR}{}}}",
        message.id, payload
    )
}

/// Payload and attributes published to Pub/Sub for an MQ message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishEnvelope {
    pub data: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

/// Byte buffer in the `{"type":"Buffer","data":[...]}` layout, keys in that order
#[derive(Serialize)]
struct NodeBuffer<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a [u8],
}

/// Build the Pub/Sub publish request for an MQ message.
///
/// String messages (`MQSTR`) are published as a JSON string literal.
/// Anything else is published as a JSON byte-buffer object
/// (`{"type":"Buffer","data":[...]}`), the shape existing consumers expect.
pub fn publish_envelope(message: &MqMessage) -> Result<PublishEnvelope> {
    let json = if message.format.is_string() {
        serde_json::to_string(&message.text())?
    } else {
        serde_json::to_string(&NodeBuffer {
            kind: "Buffer",
            data: &message.data,
        })?
    };

    let mut attributes = HashMap::new();
    attributes.insert(ORIGIN_ATTRIBUTE.to_string(), ORIGIN_IBM_MQ.to_string());
    attributes.insert(MSG_ID_ATTRIBUTE.to_string(), message.msg_id.to_hex());

    Ok(PublishEnvelope {
        data: json.into_bytes(),
        attributes,
    })
}

/// Lowercase hex, two zero-padded digits per byte in byte order
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Inverse of [`to_hex`]
pub fn from_hex(hex: &str) -> Result<Vec<u8>> {
    hex::decode(hex).map_err(|e| BridgeError::InvalidMessageId(format!("{}: {}", hex, e)))
}
