//! Per-message result

use crate::config::FailurePolicy;
use mqbridge_core::Result;
use serde::Serialize;

/// What happened to one message and what the bridge does next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Forwarded; acknowledge and keep going
    Continue,
    /// Sink failed but the message is skipped; acknowledge and keep going
    DropAndAck,
    /// Sink failed; leave the message for redelivery and stop
    FailAndExit,
}

impl Outcome {
    /// Classify a sink result under the given policy
    pub fn of<T>(result: &Result<T>, policy: FailurePolicy) -> Self {
        match (result, policy) {
            (Ok(_), _) => Outcome::Continue,
            (Err(_), FailurePolicy::Drop) => Outcome::DropAndAck,
            (Err(_), FailurePolicy::Exit) => Outcome::FailAndExit,
        }
    }

    /// Whether the message should be acknowledged
    pub fn acknowledges(self) -> bool {
        !matches!(self, Outcome::FailAndExit)
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, Outcome::FailAndExit)
    }
}
