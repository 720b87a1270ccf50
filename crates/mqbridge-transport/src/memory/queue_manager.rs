//! In-process queue manager
//!
//! Behaves like a single queue manager closely enough to drive the bridge
//! without a vendor client: defined queues, topic fan-out to managed
//! subscriptions, blocking gets with a wait interval, generated message ids.
//!
//! Every MQI call is recorded in a journal, and one-shot failures can be
//! injected per verb, which is what the pipeline tests lean on.

use crate::queue_manager::{
    MqConnection, ObjectHandle, PutReceipt, QueueManagerClient, SubscriptionHandles,
};
use async_trait::async_trait;
use mqbridge_core::{
    Binding, BridgeError, ConnectOptions, Credentials, Destination, GetOptions, MessageFormat,
    MessageId, MqMessage, MqOp, OpenOptions, PutOptions, ReasonCode, Result, SubscriptionOptions,
    message::MESSAGE_ID_LEN, reason_codes,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Stand-in deadline for waits too long to represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// One recorded MQI call
#[derive(Debug, Clone, PartialEq)]
pub struct MqCall {
    pub op: MqOp,
    /// Connection the call was made on (0 for a failed connect)
    pub connection: u64,
    /// Object handle involved, if any
    pub object: Option<u64>,
    /// Queue manager, object name or topic string
    pub target: String,
    /// `reason_codes::NONE` on success
    pub reason: ReasonCode,
}

impl MqCall {
    pub fn succeeded(&self) -> bool {
        self.reason == reason_codes::NONE
    }
}

#[derive(Debug)]
enum ObjectKind {
    Queue { name: String, input: bool },
    Topic { topic: String },
    ManagedQueue { name: String },
    Subscription { id: u64 },
}

#[derive(Debug)]
struct OpenObject {
    connection: u64,
    kind: ObjectKind,
}

#[derive(Debug)]
struct ManagedSubscription {
    topic: String,
    queue: String,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<MqMessage>>,
    subscriptions: HashMap<u64, ManagedSubscription>,
    objects: HashMap<u64, OpenObject>,
    connections: HashSet<u64>,
    next_id: u64,
    next_msg_seq: u64,
    journal: Vec<MqCall>,
    put_options: Vec<PutOptions>,
    faults: HashMap<MqOp, VecDeque<ReasonCode>>,
    required_credentials: Option<Credentials>,
    leaked_handles: usize,
    leaked_connections: usize,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Drop an open object along with any managed subscription or queue behind it
    fn release(&mut self, object: u64) {
        let Some(open) = self.objects.remove(&object) else {
            return;
        };
        match open.kind {
            ObjectKind::Subscription { id } => {
                self.subscriptions.remove(&id);
            }
            ObjectKind::ManagedQueue { name } => {
                self.queues.remove(&name);
            }
            ObjectKind::Queue { .. } | ObjectKind::Topic { .. } => {}
        }
    }

    fn take_fault(&mut self, op: MqOp) -> Option<ReasonCode> {
        self.faults.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn record(&mut self, op: MqOp, connection: u64, object: Option<u64>, target: &str, reason: ReasonCode) {
        self.journal.push(MqCall {
            op,
            connection,
            object,
            target: target.to_string(),
            reason,
        });
    }

    fn fail<T>(
        &mut self,
        op: MqOp,
        connection: u64,
        object: Option<u64>,
        target: &str,
        reason: ReasonCode,
    ) -> Result<T> {
        self.record(op, connection, object, target, reason);
        Err(BridgeError::mq(op, reason))
    }
}

struct Shared {
    name: String,
    state: Mutex<State>,
    arrivals: Notify,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_message_id(&self, seq: u64) -> MessageId {
        let mut id = [0u8; MESSAGE_ID_LEN];
        id[..4].copy_from_slice(b"AMQ ");
        let name = self.name.as_bytes();
        let len = name.len().min(12);
        id[4..4 + len].copy_from_slice(&name[..len]);
        for byte in &mut id[4 + len..16] {
            *byte = b' ';
        }
        id[16..].copy_from_slice(&seq.to_be_bytes());
        MessageId(id)
    }
}

/// In-process queue manager; clones share the same state
#[derive(Clone)]
pub struct InMemoryQueueManager {
    shared: Arc<Shared>,
}

impl InMemoryQueueManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(State::default()),
                arrivals: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Define a local queue (DEFINE QLOCAL)
    pub fn define_queue(&self, name: impl Into<String>) -> &Self {
        self.shared.state().queues.entry(name.into()).or_default();
        self
    }

    /// Reject client connections that do not present these credentials
    pub fn require_credentials(&self, credentials: Credentials) -> &Self {
        self.shared.state().required_credentials = Some(credentials);
        self
    }

    /// Place a message directly on a queue, bypassing the MQI.
    ///
    /// Returns the generated message id, or `None` if the queue is undefined.
    pub fn enqueue(&self, queue: &str, format: MessageFormat, data: impl Into<Vec<u8>>) -> Option<MessageId> {
        let msg_id = {
            let mut state = self.shared.state();
            state.next_msg_seq += 1;
            let msg_id = self.shared.new_message_id(state.next_msg_seq);
            let queue = state.queues.get_mut(queue)?;
            queue.push_back(MqMessage {
                msg_id,
                correl_id: MessageId::NONE,
                format,
                data: data.into(),
            });
            msg_id
        };
        self.shared.arrivals.notify_waiters();
        Some(msg_id)
    }

    /// Snapshot of the messages currently on a queue
    pub fn browse(&self, queue: &str) -> Vec<MqMessage> {
        self.shared
            .state()
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn depth(&self, queue: &str) -> usize {
        self.shared.state().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Make the next call of `op` fail with `reason`
    pub fn fail_next(&self, op: MqOp, reason: ReasonCode) -> &Self {
        self.shared
            .state()
            .faults
            .entry(op)
            .or_default()
            .push_back(reason);
        self
    }

    /// Every MQI call made so far
    pub fn journal(&self) -> Vec<MqCall> {
        self.shared.state().journal.clone()
    }

    /// Number of calls of `op` that succeeded
    pub fn successful_calls(&self, op: MqOp) -> usize {
        self.shared
            .state()
            .journal
            .iter()
            .filter(|call| call.op == op && call.succeeded())
            .count()
    }

    /// Number of calls of `op`, successful or not
    pub fn calls(&self, op: MqOp) -> usize {
        self.shared
            .state()
            .journal
            .iter()
            .filter(|call| call.op == op)
            .count()
    }

    /// Options of every put that reached the queue manager, in order
    pub fn put_options(&self) -> Vec<PutOptions> {
        self.shared.state().put_options.clone()
    }

    /// Queues currently defined, managed subscription queues included
    pub fn queue_count(&self) -> usize {
        self.shared.state().queues.len()
    }

    /// Handles still open right now
    pub fn open_handles(&self) -> usize {
        self.shared.state().objects.len()
    }

    /// Connections still open right now
    pub fn open_connections(&self) -> usize {
        self.shared.state().connections.len()
    }

    /// Handles that were still open when their connection went away
    pub fn leaked_handles(&self) -> usize {
        self.shared.state().leaked_handles
    }

    /// Connections dropped without a disconnect
    pub fn leaked_connections(&self) -> usize {
        self.shared.state().leaked_connections
    }
}

#[async_trait]
impl QueueManagerClient for InMemoryQueueManager {
    type Connection = InMemoryConnection;

    async fn connect(&self, queue_manager: &str, options: &ConnectOptions) -> Result<InMemoryConnection> {
        let mut state = self.shared.state();

        if let Some(reason) = state.take_fault(MqOp::Connect) {
            return state.fail(MqOp::Connect, 0, None, queue_manager, reason);
        }
        if queue_manager != self.shared.name {
            return state.fail(MqOp::Connect, 0, None, queue_manager, reason_codes::Q_MGR_NAME_ERROR);
        }
        let authorized = match (&options.binding, &state.required_credentials) {
            (Binding::Client(_), Some(required)) => options.credentials() == Some(required),
            _ => true,
        };
        if !authorized {
            return state.fail(MqOp::Connect, 0, None, queue_manager, reason_codes::NOT_AUTHORIZED);
        }

        let id = state.next_id();
        state.connections.insert(id);
        state.record(MqOp::Connect, id, None, queue_manager, reason_codes::NONE);
        debug!(connection = id, "in-memory MQCONN to {}", queue_manager);

        Ok(InMemoryConnection {
            shared: Arc::clone(&self.shared),
            id,
            disconnected: false,
        })
    }
}

/// Connection to an [`InMemoryQueueManager`]
pub struct InMemoryConnection {
    shared: Arc<Shared>,
    id: u64,
    disconnected: bool,
}

impl std::fmt::Debug for InMemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConnection")
            .field("queue_manager", &self.shared.name)
            .field("id", &self.id)
            .finish()
    }
}

impl InMemoryConnection {
    fn check_handle<'a>(&self, state: &'a State, object: &ObjectHandle) -> Option<&'a ObjectKind> {
        state
            .objects
            .get(&object.id())
            .filter(|open| open.connection == self.id)
            .map(|open| &open.kind)
    }
}

fn topic_matches(filter: &str, topic: &str) -> bool {
    if filter == "#" || filter == topic {
        return true;
    }
    match filter.strip_suffix("/#") {
        Some(prefix) => topic == prefix || topic.starts_with(&format!("{}/", prefix)),
        None => false,
    }
}

#[async_trait]
impl MqConnection for InMemoryConnection {
    async fn open(&mut self, destination: &Destination, options: OpenOptions) -> Result<ObjectHandle> {
        let mut state = self.shared.state();
        let target = destination.name();

        if let Some(reason) = state.take_fault(MqOp::Open) {
            return state.fail(MqOp::Open, self.id, None, target, reason);
        }

        let kind = match (destination, options) {
            (Destination::Queue(name), _) if !state.queues.contains_key(name) => {
                return state.fail(MqOp::Open, self.id, None, target, reason_codes::UNKNOWN_OBJECT_NAME);
            }
            (Destination::Queue(name), options) => ObjectKind::Queue {
                name: name.clone(),
                input: options == OpenOptions::InputAsQueueDefault,
            },
            (Destination::Topic(_), OpenOptions::InputAsQueueDefault) => {
                return state.fail(MqOp::Open, self.id, None, target, reason_codes::OBJECT_TYPE_ERROR);
            }
            (Destination::Topic(topic), OpenOptions::Output) => ObjectKind::Topic {
                topic: topic.clone(),
            },
        };

        let handle = state.next_id();
        state.objects.insert(
            handle,
            OpenObject {
                connection: self.id,
                kind,
            },
        );
        state.record(MqOp::Open, self.id, Some(handle), target, reason_codes::NONE);
        Ok(ObjectHandle::new(handle, target))
    }

    async fn subscribe(&mut self, topic: &str, options: &SubscriptionOptions) -> Result<SubscriptionHandles> {
        let mut state = self.shared.state();

        if let Some(reason) = state.take_fault(MqOp::Subscribe) {
            return state.fail(MqOp::Subscribe, self.id, None, topic, reason);
        }
        if !options.managed {
            // Only managed subscriptions are emulated
            return state.fail(MqOp::Subscribe, self.id, None, topic, reason_codes::OBJECT_TYPE_ERROR);
        }

        let sub_id = state.next_id();
        let queue_name = format!("SYSTEM.MANAGED.NDURABLE.{:016X}", sub_id);
        state.queues.insert(queue_name.clone(), VecDeque::new());
        state.subscriptions.insert(
            sub_id,
            ManagedSubscription {
                topic: topic.to_string(),
                queue: queue_name.clone(),
            },
        );

        let queue_handle = state.next_id();
        state.objects.insert(
            queue_handle,
            OpenObject {
                connection: self.id,
                kind: ObjectKind::ManagedQueue {
                    name: queue_name.clone(),
                },
            },
        );
        state.objects.insert(
            sub_id,
            OpenObject {
                connection: self.id,
                kind: ObjectKind::Subscription { id: sub_id },
            },
        );
        state.record(MqOp::Subscribe, self.id, Some(sub_id), topic, reason_codes::NONE);

        Ok(SubscriptionHandles {
            queue: ObjectHandle::new(queue_handle, queue_name),
            subscription: ObjectHandle::new(sub_id, topic),
        })
    }

    async fn put(
        &mut self,
        object: &ObjectHandle,
        payload: &[u8],
        format: &MessageFormat,
        options: &PutOptions,
    ) -> Result<PutReceipt> {
        let receipt = {
            let mut state = self.shared.state();
            let target = object.name();

            if let Some(reason) = state.take_fault(MqOp::Put) {
                return state.fail(MqOp::Put, self.id, Some(object.id()), target, reason);
            }

            let targets: Vec<String> = match self.check_handle(&state, object) {
                None => {
                    return state.fail(MqOp::Put, self.id, Some(object.id()), target, reason_codes::HOBJ_ERROR);
                }
                Some(ObjectKind::Queue { name, input: false }) => vec![name.clone()],
                Some(ObjectKind::Topic { topic }) => state
                    .subscriptions
                    .values()
                    .filter(|sub| topic_matches(&sub.topic, topic))
                    .map(|sub| sub.queue.clone())
                    .collect(),
                Some(_) => {
                    return state.fail(
                        MqOp::Put,
                        self.id,
                        Some(object.id()),
                        target,
                        reason_codes::NOT_OPEN_FOR_OUTPUT,
                    );
                }
            };

            state.next_msg_seq += 1;
            let msg_id = self.shared.new_message_id(state.next_msg_seq);
            let correl_id = if options.new_correl_id {
                state.next_msg_seq += 1;
                self.shared.new_message_id(state.next_msg_seq)
            } else {
                MessageId::NONE
            };

            let is_topic = matches!(self.check_handle(&state, object), Some(ObjectKind::Topic { .. }));
            let warning = (is_topic && targets.is_empty() && options.warn_if_no_subs_matched)
                .then_some(reason_codes::NO_SUBS_MATCHED);

            state.put_options.push(*options);
            for queue in &targets {
                if let Some(queue) = state.queues.get_mut(queue) {
                    queue.push_back(MqMessage {
                        msg_id,
                        correl_id,
                        format: format.clone(),
                        data: payload.to_vec(),
                    });
                }
            }

            state.record(
                MqOp::Put,
                self.id,
                Some(object.id()),
                target,
                warning.unwrap_or(reason_codes::NONE),
            );
            PutReceipt { msg_id, warning }
        };

        self.shared.arrivals.notify_waiters();
        Ok(receipt)
    }

    async fn get(&mut self, object: &ObjectHandle, options: &GetOptions) -> Result<MqMessage> {
        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(options.wait_interval)
            .unwrap_or_else(|| now + FAR_FUTURE);

        loop {
            // Register for wakeups before looking, so a put between the
            // check and the wait is not missed.
            let arrival = self.shared.arrivals.notified();

            {
                let mut state = self.shared.state();
                let target = object.name();

                if let Some(reason) = state.take_fault(MqOp::Get) {
                    return state.fail(MqOp::Get, self.id, Some(object.id()), target, reason);
                }

                let queue_name = match self.check_handle(&state, object) {
                    None => {
                        return state.fail(MqOp::Get, self.id, Some(object.id()), target, reason_codes::HOBJ_ERROR);
                    }
                    Some(ObjectKind::Queue { name, input: true }) | Some(ObjectKind::ManagedQueue { name }) => {
                        name.clone()
                    }
                    Some(_) => {
                        return state.fail(
                            MqOp::Get,
                            self.id,
                            Some(object.id()),
                            target,
                            reason_codes::NOT_OPEN_FOR_INPUT,
                        );
                    }
                };

                let found = state.queues.get_mut(&queue_name).and_then(|queue| {
                    let position = match &options.match_msg_id {
                        Some(wanted) => queue.iter().position(|m| &m.msg_id == wanted),
                        None => (!queue.is_empty()).then_some(0),
                    };
                    position.and_then(|i| queue.remove(i))
                });

                if let Some(message) = found {
                    state.record(MqOp::Get, self.id, Some(object.id()), target, reason_codes::NONE);
                    return Ok(message);
                }

                if tokio::time::Instant::now() >= deadline {
                    return state.fail(
                        MqOp::Get,
                        self.id,
                        Some(object.id()),
                        target,
                        reason_codes::NO_MSG_AVAILABLE,
                    );
                }
            }

            let _ = tokio::time::timeout_at(deadline, arrival).await;
        }
    }

    async fn close(&mut self, object: ObjectHandle) -> Result<()> {
        let mut state = self.shared.state();
        let target = object.name();

        let owned = state
            .objects
            .get(&object.id())
            .is_some_and(|open| open.connection == self.id);
        if !owned {
            return state.fail(MqOp::Close, self.id, Some(object.id()), target, reason_codes::HOBJ_ERROR);
        }

        // The handle is released even when the close reports a failure
        state.release(object.id());

        if let Some(reason) = state.take_fault(MqOp::Close) {
            return state.fail(MqOp::Close, self.id, Some(object.id()), target, reason);
        }
        state.record(MqOp::Close, self.id, Some(object.id()), target, reason_codes::NONE);
        Ok(())
    }

    async fn disconnect(mut self) -> Result<()> {
        self.disconnected = true;
        let mut state = self.shared.state();
        let name = self.shared.name.clone();

        let orphans: Vec<u64> = state
            .objects
            .iter()
            .filter(|(_, open)| open.connection == self.id)
            .map(|(id, _)| *id)
            .collect();
        if !orphans.is_empty() {
            warn!(
                connection = self.id,
                "MQDISC with {} handle(s) still open",
                orphans.len()
            );
            state.leaked_handles += orphans.len();
            for id in orphans {
                state.release(id);
            }
        }
        state.connections.remove(&self.id);

        if let Some(reason) = state.take_fault(MqOp::Disconnect) {
            return state.fail(MqOp::Disconnect, self.id, None, &name, reason);
        }
        state.record(MqOp::Disconnect, self.id, None, &name, reason_codes::NONE);
        Ok(())
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        if self.disconnected {
            return;
        }
        let mut state = self.shared.state();
        if state.connections.remove(&self.id) {
            state.leaked_connections += 1;
        }
    }
}
