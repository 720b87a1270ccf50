//! Error types for the bridge

use std::fmt;
use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A queue-manager call returned a failing reason code
    #[error("MQ call failed in {op}: {completion} [{reason}]")]
    Mq {
        op: MqOp,
        completion: CompletionCode,
        reason: ReasonCode,
    },

    /// Cloud Pub/Sub client failure
    #[error("Pub/Sub error: {0}")]
    PubSub(String),

    /// A required command line argument was not supplied
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Invalid bridge configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed hex message identifier
    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

/// Coarse classification used by the pipeline to decide what an error means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Nothing to read right now; ends a poll loop without failing it
    NoMessage,
    /// A transport call failed
    TransportFailure,
    /// Startup argument missing
    MissingArgument,
    /// Bad configuration or input
    Invalid,
}

impl BridgeError {
    /// Failed MQ call with the given reason code
    pub fn mq(op: MqOp, reason: ReasonCode) -> Self {
        BridgeError::Mq {
            op,
            completion: CompletionCode::Failed,
            reason,
        }
    }

    /// Reason code carried by an MQ error, if any
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            BridgeError::Mq { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// True for the benign "no message available" get result
    pub fn is_no_message_available(&self) -> bool {
        self.reason() == Some(reason_codes::NO_MSG_AVAILABLE)
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            _ if self.is_no_message_available() => ErrorCategory::NoMessage,
            BridgeError::Mq { .. } | BridgeError::PubSub(_) => ErrorCategory::TransportFailure,
            BridgeError::MissingArgument(_) => ErrorCategory::MissingArgument,
            BridgeError::Config(_)
            | BridgeError::InvalidMessageId(_)
            | BridgeError::Serialization(_) => ErrorCategory::Invalid,
        }
    }
}

/// Queue-manager verbs, displayed with their MQI names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MqOp {
    Connect,
    Open,
    Subscribe,
    Put,
    Get,
    Close,
    Disconnect,
}

impl fmt::Display for MqOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MqOp::Connect => "MQCONN",
            MqOp::Open => "MQOPEN",
            MqOp::Subscribe => "MQSUB",
            MqOp::Put => "MQPUT",
            MqOp::Get => "MQGET",
            MqOp::Close => "MQCLOSE",
            MqOp::Disconnect => "MQDISC",
        };
        f.write_str(name)
    }
}

/// MQI completion code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCode {
    Ok,
    Warning,
    Failed,
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionCode::Ok => f.write_str("MQCC_OK"),
            CompletionCode::Warning => f.write_str("MQCC_WARNING"),
            CompletionCode::Failed => f.write_str("MQCC_FAILED"),
        }
    }
}

/// MQI reason code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReasonCode(pub i32);

impl ReasonCode {
    /// Symbolic name for the codes the bridge knows about
    pub fn name(self) -> Option<&'static str> {
        use reason_codes::*;
        let name = match self {
            NONE => "MQRC_NONE",
            CONNECTION_BROKEN => "MQRC_CONNECTION_BROKEN",
            HCONN_ERROR => "MQRC_HCONN_ERROR",
            HOBJ_ERROR => "MQRC_HOBJ_ERROR",
            NO_MSG_AVAILABLE => "MQRC_NO_MSG_AVAILABLE",
            NOT_AUTHORIZED => "MQRC_NOT_AUTHORIZED",
            NOT_OPEN_FOR_INPUT => "MQRC_NOT_OPEN_FOR_INPUT",
            NOT_OPEN_FOR_OUTPUT => "MQRC_NOT_OPEN_FOR_OUTPUT",
            OBJECT_TYPE_ERROR => "MQRC_OBJECT_TYPE_ERROR",
            Q_FULL => "MQRC_Q_FULL",
            Q_MGR_NAME_ERROR => "MQRC_Q_MGR_NAME_ERROR",
            UNKNOWN_OBJECT_NAME => "MQRC_UNKNOWN_OBJECT_NAME",
            HOST_NOT_AVAILABLE => "MQRC_HOST_NOT_AVAILABLE",
            NO_SUBS_MATCHED => "MQRC_NO_SUBS_MATCHED",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} {}", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Well-known MQI reason codes
pub mod reason_codes {
    use super::ReasonCode;

    pub const NONE: ReasonCode = ReasonCode(0);
    pub const CONNECTION_BROKEN: ReasonCode = ReasonCode(2009);
    pub const HCONN_ERROR: ReasonCode = ReasonCode(2018);
    pub const HOBJ_ERROR: ReasonCode = ReasonCode(2019);
    pub const NO_MSG_AVAILABLE: ReasonCode = ReasonCode(2033);
    pub const NOT_AUTHORIZED: ReasonCode = ReasonCode(2035);
    pub const NOT_OPEN_FOR_INPUT: ReasonCode = ReasonCode(2037);
    pub const NOT_OPEN_FOR_OUTPUT: ReasonCode = ReasonCode(2039);
    pub const OBJECT_TYPE_ERROR: ReasonCode = ReasonCode(2043);
    pub const Q_FULL: ReasonCode = ReasonCode(2053);
    pub const Q_MGR_NAME_ERROR: ReasonCode = ReasonCode(2058);
    pub const UNKNOWN_OBJECT_NAME: ReasonCode = ReasonCode(2085);
    pub const HOST_NOT_AVAILABLE: ReasonCode = ReasonCode(2538);
    /// Warning: a topic put reached no subscriber
    pub const NO_SUBS_MATCHED: ReasonCode = ReasonCode(2550);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_message_is_benign() {
        let err = BridgeError::mq(MqOp::Get, reason_codes::NO_MSG_AVAILABLE);
        assert!(err.is_no_message_available());
        assert_eq!(err.category(), ErrorCategory::NoMessage);

        let err = BridgeError::mq(MqOp::Get, reason_codes::CONNECTION_BROKEN);
        assert!(!err.is_no_message_available());
        assert_eq!(err.category(), ErrorCategory::TransportFailure);
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::mq(MqOp::Open, reason_codes::UNKNOWN_OBJECT_NAME);
        assert_eq!(
            err.to_string(),
            "MQ call failed in MQOPEN: MQCC_FAILED [2085 MQRC_UNKNOWN_OBJECT_NAME]"
        );

        assert_eq!(ReasonCode(9999).to_string(), "9999");
    }

    #[test]
    fn test_startup_categories() {
        assert_eq!(
            BridgeError::MissingArgument("queue".into()).category(),
            ErrorCategory::MissingArgument
        );
        assert_eq!(
            BridgeError::InvalidMessageId("zz".into()).category(),
            ErrorCategory::Invalid
        );
    }
}
