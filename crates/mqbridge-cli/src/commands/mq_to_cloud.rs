use super::{ClientArgs, OnFailure};
use crate::backends;
use anyhow::{Context, Result};
use clap::Args;
use mqbridge_core::{Destination, MessageId};
use mqbridge_pipeline::{BridgeConfig, MqToCloud, PubSubSink, RunSummary, watchdog};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct MqToCloudCommand {
    /// Pub/Sub topic to publish to
    pub cloud_topic: String,

    /// Queue name, or topic string with --topic
    pub source: String,

    /// Queue manager name
    pub queue_manager: String,

    /// Read from a topic through a managed subscription
    #[arg(long)]
    pub topic: bool,

    #[command(flatten)]
    pub client: ClientArgs,

    /// Seconds a get waits before the bridge decides the source is empty
    #[arg(long, env = "MQBRIDGE_WAIT_INTERVAL", value_name = "SECS", default_value_t = 3)]
    pub wait_interval: u64,

    /// Only read the message with this hex message id
    #[arg(long, value_name = "HEX")]
    pub match_msg_id: Option<String>,

    /// What to do when a publish fails
    #[arg(long, value_enum, default_value_t = OnFailure::Exit)]
    pub on_failure: OnFailure,
}

impl MqToCloudCommand {
    fn source(&self) -> Destination {
        if self.topic {
            Destination::Topic(self.source.clone())
        } else {
            Destination::Queue(self.source.clone())
        }
    }

    fn config(&self) -> BridgeConfig {
        BridgeConfig {
            wait_interval: Duration::from_secs(self.wait_interval),
            failure_policy: self.on_failure.into(),
            ..Default::default()
        }
    }

    fn match_msg_id(&self) -> Result<Option<MessageId>> {
        self.match_msg_id
            .as_deref()
            .map(MessageId::from_hex)
            .transpose()
            .context("Invalid --match-msg-id")
    }
}

pub async fn execute(cmd: MqToCloudCommand, cancel: CancellationToken) -> Result<RunSummary> {
    let config = cmd.config();
    config.validate()?;
    let match_msg_id = cmd.match_msg_id()?;
    let source = cmd.source();

    let qm = backends::queue_manager(&cmd.queue_manager, &[&source], cmd.client.emulate_mq)?;
    let publisher = backends::publisher(&cmd.cloud_topic)
        .await
        .context("Failed to create Pub/Sub publisher")?;

    let mut bridge = MqToCloud::new(
        qm,
        cmd.queue_manager.clone(),
        cmd.client.connect_options(),
        source,
        PubSubSink::new(publisher, cmd.cloud_topic.clone()),
        config.clone(),
    );
    if let Some(msg_id) = match_msg_id {
        bridge = bridge.matching(msg_id);
    }

    tokio::spawn(watchdog(
        bridge.health(),
        config.watchdog_interval(),
        cancel.clone(),
    ));

    let summary = bridge.run(cancel.clone()).await?;
    cancel.cancel();
    Ok(summary)
}
