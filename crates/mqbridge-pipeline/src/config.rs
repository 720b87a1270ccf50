//! Bridge run configuration

use mqbridge_core::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Added to the wait interval to get the watchdog period
const WATCHDOG_GRACE: Duration = Duration::from_secs(2);

/// Longest wait interval an MQ get accepts (a signed 32-bit millisecond count)
pub const MAX_WAIT_INTERVAL: Duration = Duration::from_millis(i32::MAX as u64);

/// Largest window a tokio semaphore can hold
pub const MAX_IN_FLIGHT: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// When a cloud message is acknowledged relative to its put
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckMode {
    /// Ack once the put is confirmed (at-least-once)
    #[default]
    AfterSink,
    /// Ack on receipt (at-most-once)
    BeforeSink,
}

/// What a failed delivery does to the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the bridge with a fatal exit
    #[default]
    Exit,
    /// Skip the message and keep going
    Drop,
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// How long an MQ get waits for a message
    pub wait_interval: Duration,
    /// Stop listening to the cloud subscription after this long
    pub listen_timeout: Option<Duration>,
    /// Cloud-to-MQ deliveries allowed in flight at once
    pub max_in_flight: usize,
    pub ack_mode: AckMode,
    pub failure_policy: FailurePolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            wait_interval: Duration::from_secs(3),
            listen_timeout: None,
            max_in_flight: 1,
            ack_mode: AckMode::AfterSink,
            failure_policy: FailurePolicy::Exit,
        }
    }
}

impl BridgeConfig {
    /// Period of the health watchdog
    pub fn watchdog_interval(&self) -> Duration {
        self.wait_interval.saturating_add(WATCHDOG_GRACE)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(BridgeError::Config(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.max_in_flight > MAX_IN_FLIGHT {
            return Err(BridgeError::Config(format!(
                "max_in_flight must be at most {}",
                MAX_IN_FLIGHT
            )));
        }
        if self.wait_interval > MAX_WAIT_INTERVAL {
            return Err(BridgeError::Config(format!(
                "wait_interval must be at most {}s",
                MAX_WAIT_INTERVAL.as_secs()
            )));
        }
        if self.listen_timeout == Some(Duration::ZERO) {
            return Err(BridgeError::Config(
                "listen_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
