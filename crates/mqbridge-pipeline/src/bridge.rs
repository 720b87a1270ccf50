//! Bridge runners
//!
//! [`CloudToMq`] listens on a cloud subscription and puts each delivery to
//! MQ through a bounded window of workers. [`MqToCloud`] polls an MQ queue
//! or topic and publishes each message, one at a time.

use crate::config::{AckMode, BridgeConfig, FailurePolicy};
use crate::lifecycle::{BridgeState, ExitStatus, Health, Lifecycle};
use crate::outcome::Outcome;
use crate::sink::{MqSink, PubSubSink};
use crate::source::MqSource;
use mqbridge_core::{ConnectOptions, Destination, GetOptions, MessageId, Result};
use mqbridge_transport::{Delivery, Publisher, QueueManagerClient, Subscriber};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for one bridge run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub received: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub failed: u64,
    pub exit: ExitStatus,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            received: 0,
            forwarded: 0,
            dropped: 0,
            failed: 0,
            exit: ExitStatus::Benign,
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Continue => self.forwarded += 1,
            Outcome::DropAndAck => self.dropped += 1,
            Outcome::FailAndExit => self.failed += 1,
        }
    }
}

/// Resolves after `timeout`, or never when there is none
fn listen_deadline(timeout: Option<Duration>) -> impl Future<Output = ()> {
    async move {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    }
}

/// Cloud subscription to MQ queue or topic
pub struct CloudToMq<C: QueueManagerClient, S: Subscriber> {
    sink: Arc<MqSink<C>>,
    subscriber: S,
    config: BridgeConfig,
    health: Health,
}

impl<C: QueueManagerClient, S: Subscriber> CloudToMq<C, S> {
    pub fn new(sink: MqSink<C>, subscriber: S, config: BridgeConfig) -> Self {
        Self {
            sink: Arc::new(sink),
            subscriber,
            config,
            health: Health::new(),
        }
    }

    /// Shared health, for a watchdog to observe
    pub fn health(&self) -> Health {
        self.health.clone()
    }

    /// Listen until the subscription ends, the listen timeout passes,
    /// a delivery fails fatally, or `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunSummary> {
        self.config.validate()?;

        let mut lifecycle = Lifecycle::new();
        let mut summary = RunSummary::new();
        let window = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut workers = JoinSet::new();

        lifecycle.advance(BridgeState::Subscribed);
        info!("Forwarding to {}", self.sink.destination());

        let deadline = listen_deadline(self.config.listen_timeout);
        tokio::pin!(deadline);

        while self.health.is_healthy() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Listener cancelled");
                    break;
                }
                _ = &mut deadline => {
                    info!("{} message(s) received.", summary.received);
                    self.health.mark_drained();
                    break;
                }
                Some(joined) = workers.join_next() => {
                    self.settle(joined, &mut summary);
                }
                (permit, next) = next_with_permit(&mut self.subscriber, &window) => {
                    match next {
                        Ok(Some(delivery)) if !self.health.is_healthy() => {
                            // The run stopped while this delivery was being pulled
                            let id = delivery.message.id.clone();
                            match delivery.nack().await {
                                Ok(()) => info!("Stopping; message {} left for redelivery", id),
                                Err(e) => warn!("Failed to settle {}: {}", id, e),
                            }
                        }
                        Ok(Some(delivery)) => {
                            summary.received += 1;
                            lifecycle.advance(BridgeState::Receiving);
                            info!("Received message {}", delivery.message.id);
                            workers.spawn(self.worker().run(delivery, permit));
                        }
                        Ok(None) => {
                            info!("Subscription closed");
                            self.health.mark_drained();
                        }
                        Err(e) => {
                            error!("{}", e);
                            self.health.mark_failed();
                        }
                    }
                }
            }
        }

        lifecycle.advance(BridgeState::Draining);
        while let Some(joined) = workers.join_next().await {
            self.settle(joined, &mut summary);
        }
        lifecycle.advance(BridgeState::Closed);

        summary.exit = self.health.exit_status();
        info!(
            received = summary.received,
            forwarded = summary.forwarded,
            dropped = summary.dropped,
            failed = summary.failed,
            "Listener stopped"
        );
        Ok(summary)
    }

    fn worker(&self) -> DeliveryWorker<C> {
        DeliveryWorker {
            sink: Arc::clone(&self.sink),
            health: self.health.clone(),
            ack_mode: self.config.ack_mode,
            policy: self.config.failure_policy,
        }
    }

    fn settle(&self, joined: std::result::Result<Outcome, JoinError>, summary: &mut RunSummary) {
        match joined {
            Ok(outcome) => summary.record(outcome),
            Err(e) => {
                error!("Delivery worker failed: {}", e);
                summary.failed += 1;
                self.health.mark_failed();
            }
        }
    }
}

/// Forwards one delivery and settles it with the cloud service
struct DeliveryWorker<C: QueueManagerClient> {
    sink: Arc<MqSink<C>>,
    health: Health,
    ack_mode: AckMode,
    policy: FailurePolicy,
}

impl<C: QueueManagerClient> DeliveryWorker<C> {
    async fn run(self, delivery: Delivery, permit: Option<OwnedSemaphorePermit>) -> Outcome {
        let _permit = permit;
        let (message, acker) = delivery.into_parts();

        let pending_ack = match self.ack_mode {
            AckMode::BeforeSink => {
                if let Err(e) = acker.ack().await {
                    warn!("Failed to acknowledge {}: {}", message.id, e);
                }
                None
            }
            AckMode::AfterSink => Some(acker),
        };

        let result = self.sink.forward(&message).await;
        let outcome = Outcome::of(&result, self.policy);
        match outcome {
            Outcome::Continue => debug!("Message {} forwarded", message.id),
            Outcome::DropAndAck => warn!("Dropping message {}", message.id),
            Outcome::FailAndExit => self.health.mark_failed(),
        }

        if let Some(acker) = pending_ack {
            let settled = if outcome.acknowledges() {
                acker.ack().await
            } else {
                acker.nack().await
            };
            match settled {
                Ok(()) if outcome.acknowledges() => debug!("Message {} acknowledged", message.id),
                Ok(()) => debug!("Message {} left for redelivery", message.id),
                Err(e) => warn!("Failed to settle {}: {}", message.id, e),
            }
        }
        outcome
    }
}

async fn next_with_permit<S: Subscriber>(
    subscriber: &mut S,
    window: &Arc<Semaphore>,
) -> (Option<OwnedSemaphorePermit>, Result<Option<Delivery>>) {
    // The window is never closed, so a failed acquire only drops the bound
    let permit = Arc::clone(window).acquire_owned().await.ok();
    (permit, subscriber.next_delivery().await)
}

/// MQ queue or topic to a cloud topic
pub struct MqToCloud<C: QueueManagerClient, P: Publisher> {
    client: C,
    queue_manager: String,
    connect: ConnectOptions,
    source: Destination,
    sink: PubSubSink<P>,
    config: BridgeConfig,
    match_msg_id: Option<MessageId>,
    health: Health,
}

impl<C: QueueManagerClient, P: Publisher> MqToCloud<C, P> {
    pub fn new(
        client: C,
        queue_manager: impl Into<String>,
        connect: ConnectOptions,
        source: Destination,
        sink: PubSubSink<P>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            client,
            queue_manager: queue_manager.into(),
            connect,
            source,
            sink,
            config,
            match_msg_id: None,
            health: Health::new(),
        }
    }

    /// Only read the message with this id
    pub fn matching(mut self, msg_id: MessageId) -> Self {
        self.match_msg_id = Some(msg_id);
        self
    }

    pub fn health(&self) -> Health {
        self.health.clone()
    }

    /// Poll until no message arrives within the wait interval, a transport
    /// call fails, or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunSummary> {
        self.config.validate()?;

        let mut lifecycle = Lifecycle::new();
        let mut summary = RunSummary::new();

        let mut get_options = GetOptions::waiting(self.config.wait_interval);
        if let Some(msg_id) = self.match_msg_id {
            get_options = get_options.matching(msg_id);
        }

        let opened = MqSource::open(
            &self.client,
            &self.queue_manager,
            &self.connect,
            self.source.clone(),
            get_options,
        )
        .await;
        let mut source = match opened {
            Ok(source) => source,
            Err(_) => {
                self.health.mark_failed();
                lifecycle.advance(BridgeState::Closed);
                summary.exit = self.health.exit_status();
                return Ok(summary);
            }
        };
        lifecycle.advance(BridgeState::Open);
        info!("Publishing {} to {}", self.source, self.sink.topic());

        while self.health.is_healthy() {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Poller cancelled");
                    break;
                }
                received = source.receive() => received,
            };

            match received {
                Ok(message) => {
                    summary.received += 1;
                    lifecycle.advance(BridgeState::Receiving);
                    debug!("MQ MsgId: {}", message.msg_id);

                    let result = self.sink.forward(&message).await;
                    let outcome = Outcome::of(&result, self.config.failure_policy);
                    summary.record(outcome);
                    match outcome {
                        Outcome::Continue => {}
                        Outcome::DropAndAck => warn!("Dropping MQ message {}", message.msg_id),
                        Outcome::FailAndExit => self.health.mark_failed(),
                    }
                }
                Err(e) if e.is_no_message_available() => {
                    info!("No more messages available.");
                    self.health.mark_drained();
                }
                Err(e) => {
                    error!("{}", e);
                    self.health.mark_failed();
                }
            }
        }

        lifecycle.advance(BridgeState::Draining);
        if let Err(e) = source.close().await {
            debug!("Source released with errors: {}", e);
        }
        self.sink.shutdown().await;
        lifecycle.advance(BridgeState::Closed);

        summary.exit = self.health.exit_status();
        info!(
            received = summary.received,
            forwarded = summary.forwarded,
            dropped = summary.dropped,
            failed = summary.failed,
            "Poller stopped"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqbridge_core::{MessageFormat, MqOp, envelope, reason_codes};
    use mqbridge_transport::memory::InMemorySubscriber;
    use mqbridge_transport::{InMemoryPubSub, InMemoryQueueManager, MqConnection};
    use tokio_test::assert_ok;

    const QM: &str = "QM1";
    const QUEUE: &str = "DEV.QUEUE.1";
    const SUBSCRIPTION: &str = "orders-sub";

    fn cloud_to_mq(
        qm: &InMemoryQueueManager,
        pubsub: &InMemoryPubSub,
        destination: Destination,
        config: BridgeConfig,
    ) -> CloudToMq<InMemoryQueueManager, InMemorySubscriber> {
        let sink = MqSink::new(qm.clone(), QM, ConnectOptions::local(), destination);
        let subscriber = pubsub.subscriber(SUBSCRIPTION).unwrap();
        CloudToMq::new(sink, subscriber, config)
    }

    fn mq_to_cloud(
        qm: &InMemoryQueueManager,
        pubsub: &InMemoryPubSub,
        source: Destination,
        config: BridgeConfig,
    ) -> MqToCloud<InMemoryQueueManager, InMemoryPubSub> {
        MqToCloud::new(
            qm.clone(),
            QM,
            ConnectOptions::local(),
            source,
            PubSubSink::new(pubsub.clone(), "orders"),
            config,
        )
    }

    fn setup() -> (InMemoryQueueManager, InMemoryPubSub) {
        let qm = InMemoryQueueManager::new(QM);
        qm.define_queue(QUEUE);
        let pubsub = InMemoryPubSub::new();
        pubsub.create_subscription("orders", SUBSCRIPTION);
        (qm, pubsub)
    }

    fn assert_balanced(qm: &InMemoryQueueManager) {
        assert_eq!(
            qm.successful_calls(MqOp::Open) + qm.successful_calls(MqOp::Subscribe) * 2,
            qm.calls(MqOp::Close)
        );
        assert_eq!(qm.successful_calls(MqOp::Connect), qm.calls(MqOp::Disconnect));
        assert_eq!(qm.open_handles(), 0);
        assert_eq!(qm.open_connections(), 0);
        assert_eq!(qm.leaked_handles() + qm.leaked_connections(), 0);
    }

    #[tokio::test]
    async fn test_cloud_to_queue() {
        let (qm, pubsub) = setup();
        let id = pubsub.push(SUBSCRIPTION, "hello").unwrap();
        pubsub.close_subscription(SUBSCRIPTION);

        let bridge = cloud_to_mq(&qm, &pubsub, Destination::Queue(QUEUE.into()), BridgeConfig::default());
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.received, 1);
        assert_eq!(summary.forwarded, 1);
        assert_eq!(summary.exit, ExitStatus::Benign);

        let messages = qm.browse(QUEUE);
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].text(),
            format!("\"googleID\": {}\r\"Content\": {{\rhello}}", id)
        );
        assert_eq!(pubsub.acked(), vec![id]);
        assert_balanced(&qm);
    }

    #[tokio::test]
    async fn test_cloud_to_topic_without_subscribers() {
        let (qm, pubsub) = setup();
        pubsub.push(SUBSCRIPTION, "hello");
        pubsub.close_subscription(SUBSCRIPTION);

        let bridge = cloud_to_mq(
            &qm,
            &pubsub,
            Destination::Topic("dev/orders".into()),
            BridgeConfig::default(),
        );
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.forwarded, 1);
        assert_eq!(summary.exit, ExitStatus::Benign);
        let put = qm
            .journal()
            .into_iter()
            .find(|call| call.op == MqOp::Put)
            .unwrap();
        assert_eq!(put.reason, reason_codes::NO_SUBS_MATCHED);
        assert_balanced(&qm);
    }

    #[tokio::test]
    async fn test_failed_put_is_nacked_and_fatal() {
        let (qm, pubsub) = setup();
        qm.fail_next(MqOp::Put, reason_codes::Q_FULL);
        let first = pubsub.push(SUBSCRIPTION, "first").unwrap();
        pubsub.push(SUBSCRIPTION, "second");

        let bridge = cloud_to_mq(&qm, &pubsub, Destination::Queue(QUEUE.into()), BridgeConfig::default());
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.received, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit, ExitStatus::Fatal);
        assert_eq!(summary.exit.code(), 1);
        assert_eq!(pubsub.nacked(), vec![first]);
        assert!(pubsub.acked().is_empty());
        assert_eq!(pubsub.backlog(SUBSCRIPTION), 1);
        assert_eq!(qm.depth(QUEUE), 0);
        assert_balanced(&qm);
    }

    #[tokio::test]
    async fn test_drop_policy_acks_and_continues() {
        let (qm, pubsub) = setup();
        qm.fail_next(MqOp::Put, reason_codes::Q_FULL);
        let first = pubsub.push(SUBSCRIPTION, "first").unwrap();
        let second = pubsub.push(SUBSCRIPTION, "second").unwrap();
        pubsub.close_subscription(SUBSCRIPTION);

        let config = BridgeConfig {
            failure_policy: FailurePolicy::Drop,
            ..Default::default()
        };
        let bridge = cloud_to_mq(&qm, &pubsub, Destination::Queue(QUEUE.into()), config);
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.received, 2);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.forwarded, 1);
        assert_eq!(summary.exit, ExitStatus::Benign);
        assert_eq!(pubsub.acked(), vec![first, second]);
        assert_eq!(qm.depth(QUEUE), 1);
        assert_balanced(&qm);
    }

    #[tokio::test]
    async fn test_ack_before_put() {
        let (qm, pubsub) = setup();
        qm.fail_next(MqOp::Put, reason_codes::Q_FULL);
        let id = pubsub.push(SUBSCRIPTION, "lost").unwrap();

        let config = BridgeConfig {
            ack_mode: AckMode::BeforeSink,
            ..Default::default()
        };
        let bridge = cloud_to_mq(&qm, &pubsub, Destination::Queue(QUEUE.into()), config);
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.exit, ExitStatus::Fatal);
        assert_eq!(pubsub.acked(), vec![id]);
        assert!(pubsub.nacked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_timeout_is_benign() {
        let (qm, pubsub) = setup();
        pubsub.push(SUBSCRIPTION, "one");

        let config = BridgeConfig {
            listen_timeout: Some(Duration::from_secs(180)),
            ..Default::default()
        };
        let bridge = cloud_to_mq(&qm, &pubsub, Destination::Queue(QUEUE.into()), config);
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.received, 1);
        assert_eq!(summary.forwarded, 1);
        assert_eq!(summary.exit, ExitStatus::Benign);
    }

    #[tokio::test]
    async fn test_wide_window_forwards_everything() {
        let (qm, pubsub) = setup();
        for i in 0..8 {
            pubsub.push(SUBSCRIPTION, format!("msg-{}", i));
        }
        pubsub.close_subscription(SUBSCRIPTION);

        let config = BridgeConfig {
            max_in_flight: 4,
            ..Default::default()
        };
        let bridge = cloud_to_mq(&qm, &pubsub, Destination::Queue(QUEUE.into()), config);
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.forwarded, 8);
        assert_eq!(qm.depth(QUEUE), 8);
        assert_eq!(pubsub.acked().len(), 8);
        assert_balanced(&qm);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_after_failure_is_nacked() {
        let (qm, pubsub) = setup();
        let bridge = cloud_to_mq(&qm, &pubsub, Destination::Queue(QUEUE.into()), BridgeConfig::default());

        let health = bridge.health();
        let feeder = pubsub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            health.mark_failed();
            feeder.push(SUBSCRIPTION, "late");
        });

        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.received, 0);
        assert_eq!(summary.exit, ExitStatus::Fatal);
        assert_eq!(pubsub.nacked().len(), 1);
        assert!(pubsub.acked().is_empty());
        assert_eq!(qm.depth(QUEUE), 0);
        assert_eq!(qm.calls(MqOp::Connect), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_listener() {
        let (qm, pubsub) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let bridge = cloud_to_mq(&qm, &pubsub, Destination::Queue(QUEUE.into()), BridgeConfig::default());
        let summary = assert_ok!(bridge.run(cancel).await);
        assert_eq!(summary.received, 0);
        assert_eq!(summary.exit, ExitStatus::Benign);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_to_cloud() {
        let (qm, pubsub) = setup();
        let msg_id = qm.enqueue(QUEUE, MessageFormat::String, "hello").unwrap();
        qm.enqueue(QUEUE, MessageFormat::None, vec![1u8, 2, 3]);

        let bridge = mq_to_cloud(&qm, &pubsub, Destination::Queue(QUEUE.into()), BridgeConfig::default());
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.received, 2);
        assert_eq!(summary.forwarded, 2);
        assert_eq!(summary.exit, ExitStatus::Benign);

        let published = pubsub.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].envelope.data, b"\"hello\"".to_vec());
        assert_eq!(
            published[0].envelope.attributes[envelope::MSG_ID_ATTRIBUTE],
            msg_id.to_hex()
        );
        assert_eq!(
            published[0].envelope.attributes[envelope::ORIGIN_ATTRIBUTE],
            "ibm-mq"
        );
        assert_eq!(
            published[1].envelope.data,
            br#"{"type":"Buffer","data":[1,2,3]}"#.to_vec()
        );

        assert_eq!(qm.depth(QUEUE), 0);
        assert_balanced(&qm);
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_msg_id_reads_one() {
        let (qm, pubsub) = setup();
        qm.enqueue(QUEUE, MessageFormat::String, "skip");
        let wanted = qm.enqueue(QUEUE, MessageFormat::String, "take").unwrap();

        let bridge = mq_to_cloud(&qm, &pubsub, Destination::Queue(QUEUE.into()), BridgeConfig::default())
            .matching(wanted);
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.forwarded, 1);
        assert_eq!(pubsub.published()[0].envelope.data, b"\"take\"".to_vec());
        assert_eq!(qm.depth(QUEUE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_topic_to_cloud_releases_subscription() {
        let (qm, pubsub) = setup();
        let bridge = mq_to_cloud(
            &qm,
            &pubsub,
            Destination::Topic("dev/orders".into()),
            BridgeConfig::default(),
        );
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.received, 0);
        assert_eq!(summary.exit, ExitStatus::Benign);
        assert_eq!(qm.successful_calls(MqOp::Subscribe), 1);
        assert_balanced(&qm);
    }

    #[tokio::test(start_paused = true)]
    async fn test_topic_to_cloud_publishes() {
        let (qm, pubsub) = setup();
        let bridge = mq_to_cloud(
            &qm,
            &pubsub,
            Destination::Topic("dev/orders".into()),
            BridgeConfig::default(),
        );
        // Publish once the bridge has subscribed
        let publish = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(qm.successful_calls(MqOp::Subscribe), 1);

            let mut publisher = assert_ok!(qm.connect(QM, &ConnectOptions::local()).await);
            let topic = assert_ok!(
                publisher
                    .open(&Destination::Topic("dev/orders".into()), mqbridge_core::OpenOptions::Output)
                    .await
            );
            let receipt = assert_ok!(
                publisher
                    .put(
                        &topic,
                        b"event",
                        &MessageFormat::String,
                        &mqbridge_core::PutOptions::for_topic()
                    )
                    .await
            );
            assert_ok!(publisher.close(topic).await);
            assert_ok!(publisher.disconnect().await);
            receipt
        };
        let (summary, receipt) = tokio::join!(bridge.run(CancellationToken::new()), publish);

        let summary = assert_ok!(summary);
        assert!(receipt.warning.is_none());
        assert_eq!(summary.received, 1);
        assert_eq!(summary.forwarded, 1);
        assert_eq!(summary.exit, ExitStatus::Benign);

        let published = pubsub.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "orders");
        assert_eq!(published[0].envelope.data, b"\"event\"".to_vec());
        assert_eq!(
            published[0].envelope.attributes[envelope::MSG_ID_ATTRIBUTE],
            receipt.msg_id.to_hex()
        );
        assert_eq!(
            published[0].envelope.attributes[envelope::ORIGIN_ATTRIBUTE],
            envelope::ORIGIN_IBM_MQ
        );
        assert_eq!(qm.queue_count(), 1);
        assert_balanced(&qm);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mq_to_cloud_drop_policy_continues() {
        let (qm, pubsub) = setup();
        pubsub.fail_next_publish("unavailable");
        qm.enqueue(QUEUE, MessageFormat::String, "one");
        let second = qm.enqueue(QUEUE, MessageFormat::String, "two").unwrap();

        let config = BridgeConfig {
            failure_policy: FailurePolicy::Drop,
            ..Default::default()
        };
        let bridge = mq_to_cloud(&qm, &pubsub, Destination::Queue(QUEUE.into()), config);
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.received, 2);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.forwarded, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.exit, ExitStatus::Benign);

        let published = pubsub.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].envelope.data, b"\"two\"".to_vec());
        assert_eq!(
            published[0].envelope.attributes[envelope::MSG_ID_ATTRIBUTE],
            second.to_hex()
        );
        assert_eq!(qm.depth(QUEUE), 0);
        assert_balanced(&qm);
    }

    #[tokio::test]
    async fn test_get_failure_is_fatal() {
        let (qm, pubsub) = setup();
        qm.fail_next(MqOp::Get, reason_codes::CONNECTION_BROKEN);

        let bridge = mq_to_cloud(&qm, &pubsub, Destination::Queue(QUEUE.into()), BridgeConfig::default());
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.exit, ExitStatus::Fatal);
        assert_balanced(&qm);
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let (qm, pubsub) = setup();
        qm.fail_next(MqOp::Connect, reason_codes::HOST_NOT_AVAILABLE);

        let bridge = mq_to_cloud(&qm, &pubsub, Destination::Queue(QUEUE.into()), BridgeConfig::default());
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.exit, ExitStatus::Fatal);
        assert_eq!(qm.calls(MqOp::Open), 0);
        assert_eq!(qm.calls(MqOp::Disconnect), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_stops_poller() {
        let (qm, pubsub) = setup();
        pubsub.fail_next_publish("unavailable");
        qm.enqueue(QUEUE, MessageFormat::String, "one");
        qm.enqueue(QUEUE, MessageFormat::String, "two");

        let bridge = mq_to_cloud(&qm, &pubsub, Destination::Queue(QUEUE.into()), BridgeConfig::default());
        let summary = assert_ok!(bridge.run(CancellationToken::new()).await);

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit, ExitStatus::Fatal);
        assert_eq!(qm.depth(QUEUE), 1);
        assert_balanced(&qm);
    }
}
