use super::{ClientArgs, OnFailure};
use crate::backends;
use anyhow::{Context, Result};
use clap::Args;
use mqbridge_core::Destination;
use mqbridge_pipeline::{AckMode, BridgeConfig, CloudToMq, MqSink, RunSummary, watchdog};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args, Debug)]
pub struct CloudToMqCommand {
    /// Pub/Sub subscription to listen on
    pub subscription: String,

    /// Queue name, or topic string with --topic
    pub destination: String,

    /// Queue manager name
    pub queue_manager: String,

    /// Put to a topic instead of a queue
    #[arg(long)]
    pub topic: bool,

    #[command(flatten)]
    pub client: ClientArgs,

    /// Deliveries forwarded concurrently; above 1, MQ order is not kept
    #[arg(long, env = "MQBRIDGE_MAX_IN_FLIGHT", default_value_t = 1)]
    pub max_in_flight: usize,

    /// Stop listening after this many seconds
    #[arg(long, value_name = "SECS")]
    pub listen_timeout: Option<u64>,

    /// Acknowledge on receipt rather than after the put (at-most-once)
    #[arg(long)]
    pub ack_before_put: bool,

    /// What to do when a put fails
    #[arg(long, value_enum, default_value_t = OnFailure::Exit)]
    pub on_failure: OnFailure,
}

impl CloudToMqCommand {
    fn destination(&self) -> Destination {
        if self.topic {
            Destination::Topic(self.destination.clone())
        } else {
            Destination::Queue(self.destination.clone())
        }
    }

    fn config(&self) -> BridgeConfig {
        BridgeConfig {
            listen_timeout: self.listen_timeout.map(Duration::from_secs),
            max_in_flight: self.max_in_flight,
            ack_mode: if self.ack_before_put {
                AckMode::BeforeSink
            } else {
                AckMode::AfterSink
            },
            failure_policy: self.on_failure.into(),
            ..Default::default()
        }
    }
}

pub async fn execute(cmd: CloudToMqCommand, cancel: CancellationToken) -> Result<RunSummary> {
    let config = cmd.config();
    config.validate()?;
    let destination = cmd.destination();

    let qm = backends::queue_manager(&cmd.queue_manager, &[&destination], cmd.client.emulate_mq)?;
    let sink = MqSink::new(
        qm,
        cmd.queue_manager.clone(),
        cmd.client.connect_options(),
        destination,
    );
    let subscriber = backends::subscriber(&cmd.subscription)
        .await
        .with_context(|| format!("Failed to open subscription {}", cmd.subscription))?;

    info!("Listening on {}", cmd.subscription);
    let bridge = CloudToMq::new(sink, subscriber, config.clone());
    tokio::spawn(watchdog(
        bridge.health(),
        config.watchdog_interval(),
        cancel.clone(),
    ));

    let summary = bridge.run(cancel.clone()).await?;
    cancel.cancel();
    Ok(summary)
}
