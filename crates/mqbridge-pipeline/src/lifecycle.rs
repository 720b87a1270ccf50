//! Bridge lifecycle
//!
//! [`BridgeState`] tracks where a run is; [`Health`] is the shared flag set
//! the watchdog inspects; [`ExitStatus`] is what the process reports.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where a bridge run is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Connecting to the queue manager
    Connecting,
    /// Source object open
    Open,
    /// Push subscription established
    Subscribed,
    /// Pulling or forwarding messages
    Receiving,
    /// Releasing handles
    Draining,
    /// Everything released
    Closed,
}

impl BridgeState {
    pub fn can_transition_to(self, next: BridgeState) -> bool {
        use BridgeState::*;
        matches!(
            (self, next),
            (Connecting, Open)
                | (Connecting, Subscribed)
                | (Connecting, Closed)
                | (Open, Receiving)
                | (Open, Draining)
                | (Subscribed, Receiving)
                | (Subscribed, Draining)
                | (Receiving, Receiving)
                | (Receiving, Draining)
                | (Draining, Closed)
        )
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BridgeState::Connecting => "connecting",
            BridgeState::Open => "open",
            BridgeState::Subscribed => "subscribed",
            BridgeState::Receiving => "receiving",
            BridgeState::Draining => "draining",
            BridgeState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State machine that refuses illegal moves
#[derive(Debug)]
pub struct Lifecycle {
    state: BridgeState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: BridgeState::Connecting,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Move to `next`; returns false and stays put if the move is illegal
    pub fn advance(&mut self, next: BridgeState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!("Illegal bridge transition {} -> {}", self.state, next);
            return false;
        }
        if self.state != next {
            debug!("Bridge {} -> {}", self.state, next);
        }
        self.state = next;
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// How the process should exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Ran out of work or was stopped; exit code 0
    Benign,
    /// A transport call failed; exit code 1
    Fatal,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Benign => 0,
            ExitStatus::Fatal => 1,
        }
    }
}

#[derive(Debug)]
struct HealthFlags {
    healthy: AtomicBool,
    fatal: AtomicBool,
}

/// Shared run health, cheap to clone
#[derive(Debug, Clone)]
pub struct Health {
    flags: Arc<HealthFlags>,
}

impl Health {
    pub fn new() -> Self {
        Self {
            flags: Arc::new(HealthFlags {
                healthy: AtomicBool::new(true),
                fatal: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.flags.healthy.load(Ordering::SeqCst)
    }

    /// No more work; stop without failing
    pub fn mark_drained(&self) {
        self.flags.healthy.store(false, Ordering::SeqCst);
    }

    /// A transport call failed; stop with a fatal exit
    pub fn mark_failed(&self) {
        self.flags.fatal.store(true, Ordering::SeqCst);
        self.flags.healthy.store(false, Ordering::SeqCst);
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.flags.fatal.load(Ordering::SeqCst) {
            ExitStatus::Fatal
        } else {
            ExitStatus::Benign
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel `cancel` once `health` turns unhealthy, checking every `interval`.
///
/// Returns when it cancels or when `cancel` is triggered elsewhere.
pub async fn watchdog(health: Health, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                if !health.is_healthy() {
                    info!("Exiting ...");
                    cancel.cancel();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use BridgeState::*;
        assert!(Connecting.can_transition_to(Open));
        assert!(Connecting.can_transition_to(Closed));
        assert!(Receiving.can_transition_to(Receiving));
        assert!(Subscribed.can_transition_to(Draining));
        assert!(!Closed.can_transition_to(Receiving));
        assert!(!Draining.can_transition_to(Receiving));
        assert!(!Open.can_transition_to(Closed));
    }

    #[test]
    fn test_lifecycle_rejects_illegal_move() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.advance(BridgeState::Closed));
        assert!(!lifecycle.advance(BridgeState::Receiving));
        assert_eq!(lifecycle.state(), BridgeState::Closed);
    }

    #[test]
    fn test_health() {
        let health = Health::new();
        assert!(health.is_healthy());
        assert_eq!(health.exit_status(), ExitStatus::Benign);

        let shared = health.clone();
        shared.mark_drained();
        assert!(!health.is_healthy());
        assert_eq!(health.exit_status().code(), 0);

        shared.mark_failed();
        assert_eq!(health.exit_status(), ExitStatus::Fatal);
        assert_eq!(health.exit_status().code(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_cancels_when_unhealthy() {
        let health = Health::new();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(watchdog(
            health.clone(),
            Duration::from_secs(5),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(!cancel.is_cancelled());

        health.mark_failed();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(cancel.is_cancelled());
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_stops_on_external_cancel() {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(watchdog(Health::new(), Duration::from_secs(5), cancel.clone()));
        cancel.cancel();
        task.await.unwrap();
    }
}
