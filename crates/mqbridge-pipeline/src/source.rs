//! Queue-manager source
//!
//! Holds one connection for the whole run. A queue source opens the queue
//! for input; a topic source creates a managed non-durable subscription and
//! reads from the queue the queue manager hands back.

use mqbridge_core::{
    ConnectOptions, Destination, GetOptions, MqMessage, OpenOptions, Result, SubscriptionOptions,
};
use mqbridge_transport::{MqConnection, ObjectHandle, QueueManagerClient, SubscriptionHandles};
use tracing::{error, info, warn};

enum SourceHandles {
    Queue(ObjectHandle),
    Topic(SubscriptionHandles),
}

/// Open source object on a live connection
pub struct MqSource<Conn: MqConnection> {
    conn: Conn,
    handles: SourceHandles,
    get_options: GetOptions,
    source: Destination,
}

impl<Conn: MqConnection> MqSource<Conn> {
    /// Connect and open `source` for reading.
    ///
    /// If the open fails the connection is released before returning.
    pub async fn open<C>(
        client: &C,
        queue_manager: &str,
        connect: &ConnectOptions,
        source: Destination,
        get_options: GetOptions,
    ) -> Result<Self>
    where
        C: QueueManagerClient<Connection = Conn>,
    {
        let mut conn = match client.connect(queue_manager, connect).await {
            Ok(conn) => {
                info!("MQCONN to {} successful", queue_manager);
                conn
            }
            Err(e) => {
                error!("{}", e);
                return Err(e);
            }
        };

        let opened = match &source {
            Destination::Queue(_) => conn
                .open(&source, OpenOptions::InputAsQueueDefault)
                .await
                .map(SourceHandles::Queue),
            Destination::Topic(topic) => conn
                .subscribe(topic, &SubscriptionOptions::default())
                .await
                .map(SourceHandles::Topic),
        };

        match opened {
            Ok(handles) => {
                match &handles {
                    SourceHandles::Queue(_) => info!("MQOPEN of {} successful", source.name()),
                    SourceHandles::Topic(_) => info!("MQSUB to {} successful", source.name()),
                }
                Ok(Self {
                    conn,
                    handles,
                    get_options,
                    source,
                })
            }
            Err(e) => {
                error!("{}", e);
                match conn.disconnect().await {
                    Ok(()) => info!("MQDISC successful"),
                    Err(e) => warn!("{}", e),
                }
                Err(e)
            }
        }
    }

    pub fn source(&self) -> &Destination {
        &self.source
    }

    /// Get the next message, waiting up to the configured interval
    pub async fn receive(&mut self) -> Result<MqMessage> {
        let queue = match &self.handles {
            SourceHandles::Queue(queue) => queue,
            SourceHandles::Topic(handles) => &handles.queue,
        };
        self.conn.get(queue, &self.get_options).await
    }

    /// Release every handle, then the connection.
    ///
    /// All steps run even if one fails; the first failure is returned.
    pub async fn close(self) -> Result<()> {
        let Self {
            mut conn, handles, ..
        } = self;
        let mut first_error = None;

        let objects = match handles {
            SourceHandles::Queue(queue) => vec![queue],
            SourceHandles::Topic(handles) => vec![handles.subscription, handles.queue],
        };
        for object in objects {
            match conn.close(object).await {
                Ok(()) => info!("MQCLOSE successful"),
                Err(e) => {
                    warn!("{}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match conn.disconnect().await {
            Ok(()) => info!("MQDISC successful"),
            Err(e) => {
                warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl<Conn: MqConnection> std::fmt::Debug for MqSource<Conn> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqSource")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqbridge_core::{MessageFormat, MqOp, reason_codes};
    use mqbridge_transport::InMemoryQueueManager;
    use mqbridge_transport::memory::InMemoryConnection;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const QM: &str = "QM1";
    const QUEUE: &str = "DEV.QUEUE.1";

    async fn open(
        qm: &InMemoryQueueManager,
        source: Destination,
    ) -> Result<MqSource<InMemoryConnection>> {
        MqSource::open(
            qm,
            QM,
            &ConnectOptions::local(),
            source,
            GetOptions::waiting(Duration::from_secs(3)),
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_source_reads_until_empty() {
        let qm = InMemoryQueueManager::new(QM);
        qm.define_queue(QUEUE);
        qm.enqueue(QUEUE, MessageFormat::String, "one");

        let mut source = assert_ok!(open(&qm, Destination::Queue(QUEUE.into())).await);
        let msg = assert_ok!(source.receive().await);
        assert_eq!(msg.text(), "one");

        let err = assert_err!(source.receive().await);
        assert!(err.is_no_message_available());

        assert_ok!(source.close().await);
        assert_eq!(qm.open_handles(), 0);
        assert_eq!(qm.successful_calls(MqOp::Disconnect), 1);
    }

    #[tokio::test]
    async fn test_topic_source_uses_managed_subscription() {
        let qm = InMemoryQueueManager::new(QM);
        let mut source = assert_ok!(open(&qm, Destination::Topic("dev/orders".into())).await);

        let mut publisher = assert_ok!(qm.connect(QM, &ConnectOptions::local()).await);
        let topic = assert_ok!(
            publisher
                .open(&Destination::Topic("dev/orders".into()), OpenOptions::Output)
                .await
        );
        assert_ok!(
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

        let msg = assert_ok!(source.receive().await);
        assert_eq!(msg.text(), "event");
        assert_ok!(source.close().await);

        // Subscription first, then the managed queue
        let closes: Vec<_> = qm
            .journal()
            .into_iter()
            .filter(|call| call.op == MqOp::Close && call.connection == 1)
            .map(|call| call.target)
            .collect();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[0], "dev/orders");
        assert!(closes[1].starts_with("SYSTEM.MANAGED"));
        assert_eq!(qm.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_disconnects() {
        let qm = InMemoryQueueManager::new(QM);
        let err = assert_err!(open(&qm, Destination::Queue("MISSING".into())).await);
        assert_eq!(err.reason(), Some(reason_codes::UNKNOWN_OBJECT_NAME));
        assert_eq!(qm.successful_calls(MqOp::Connect), 1);
        assert_eq!(qm.successful_calls(MqOp::Disconnect), 1);
        assert_eq!(qm.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_close_reports_first_failure() {
        let qm = InMemoryQueueManager::new(QM);
        qm.define_queue(QUEUE);
        let source = assert_ok!(open(&qm, Destination::Queue(QUEUE.into())).await);

        qm.fail_next(MqOp::Close, reason_codes::CONNECTION_BROKEN);
        let err = assert_err!(source.close().await);
        assert_eq!(err.reason(), Some(reason_codes::CONNECTION_BROKEN));
        assert_eq!(qm.calls(MqOp::Disconnect), 1);
        assert_eq!(qm.open_connections(), 0);
    }
}
