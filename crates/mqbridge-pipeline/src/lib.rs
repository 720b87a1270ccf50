//! # mqbridge-pipeline
//!
//! Moves messages between Pub/Sub and a queue manager.
//!
//! This crate provides:
//! - Sink adapters (MqSink, PubSubSink) and the MQ source (MqSource)
//! - Bridge runners for each direction (CloudToMq, MqToCloud)
//! - Lifecycle state, shared health and the watchdog
//! - Run configuration and per-message outcomes

pub mod bridge;
pub mod config;
pub mod lifecycle;
pub mod outcome;
pub mod sink;
pub mod source;

pub use bridge::{CloudToMq, MqToCloud, RunSummary};
pub use config::{AckMode, BridgeConfig, FailurePolicy, MAX_IN_FLIGHT, MAX_WAIT_INTERVAL};
pub use lifecycle::{BridgeState, ExitStatus, Health, Lifecycle, watchdog};
pub use outcome::Outcome;
pub use sink::{MqSink, PubSubSink};
pub use source::MqSource;
