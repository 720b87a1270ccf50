//! In-process Pub/Sub service
//!
//! Topics fan out to their subscriptions; subscribers wait for pushes.
//! Acks and nacks are recorded but a nacked message is not redelivered.

use crate::pubsub::{Acknowledger, Delivery, Publisher, Subscriber};
use async_trait::async_trait;
use mqbridge_core::{BridgeError, CloudMessage, PublishEnvelope, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

/// A message accepted by [`InMemoryPubSub`]'s publisher
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub id: String,
    pub envelope: PublishEnvelope,
}

#[derive(Default)]
struct SubscriptionState {
    pending: VecDeque<CloudMessage>,
    closed: bool,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<String>>,
    subscriptions: HashMap<String, SubscriptionState>,
    published: Vec<PublishedMessage>,
    acked: Vec<String>,
    nacked: Vec<String>,
    publish_faults: VecDeque<String>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    pushes: Notify,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process Pub/Sub; clones share the same topics and subscriptions
#[derive(Clone, Default)]
pub struct InMemoryPubSub {
    shared: Arc<Shared>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_topic(&self, topic: impl Into<String>) -> &Self {
        self.shared.state().topics.entry(topic.into()).or_default();
        self
    }

    /// Attach a subscription to a topic, creating the topic if needed
    pub fn create_subscription(&self, topic: &str, subscription: impl Into<String>) -> &Self {
        let subscription = subscription.into();
        let mut state = self.shared.state();
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(subscription.clone());
        state.subscriptions.entry(subscription).or_default();
        self
    }

    /// Push a message straight onto a subscription, assigning it an id.
    ///
    /// Returns the id, or `None` if the subscription does not exist.
    pub fn push(&self, subscription: &str, data: impl Into<Vec<u8>>) -> Option<String> {
        let id = {
            let mut state = self.shared.state();
            let id = state.next_id();
            let sub = state.subscriptions.get_mut(subscription)?;
            sub.pending.push_back(CloudMessage::new(id.clone(), data));
            id
        };
        self.shared.pushes.notify_waiters();
        Some(id)
    }

    /// Stop a subscription; its subscriber ends once drained
    pub fn close_subscription(&self, subscription: &str) {
        if let Some(sub) = self.shared.state().subscriptions.get_mut(subscription) {
            sub.closed = true;
        }
        self.shared.pushes.notify_waiters();
    }

    /// Make the next publish fail with `message`
    pub fn fail_next_publish(&self, message: impl Into<String>) -> &Self {
        self.shared.state().publish_faults.push_back(message.into());
        self
    }

    pub fn subscriber(&self, subscription: &str) -> Result<InMemorySubscriber> {
        if !self.shared.state().subscriptions.contains_key(subscription) {
            return Err(BridgeError::PubSub(format!(
                "subscription not found: {}",
                subscription
            )));
        }
        Ok(InMemorySubscriber {
            shared: Arc::clone(&self.shared),
            subscription: subscription.to_string(),
        })
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.shared.state().published.clone()
    }

    /// Ids acknowledged so far, in order
    pub fn acked(&self) -> Vec<String> {
        self.shared.state().acked.clone()
    }

    /// Ids negatively acknowledged so far, in order
    pub fn nacked(&self) -> Vec<String> {
        self.shared.state().nacked.clone()
    }

    /// Messages waiting on a subscription
    pub fn backlog(&self, subscription: &str) -> usize {
        self.shared
            .state()
            .subscriptions
            .get(subscription)
            .map_or(0, |sub| sub.pending.len())
    }
}

#[async_trait]
impl Publisher for InMemoryPubSub {
    async fn publish(&self, topic: &str, envelope: PublishEnvelope) -> Result<String> {
        let id = {
            let mut state = self.shared.state();
            if let Some(fault) = state.publish_faults.pop_front() {
                return Err(BridgeError::PubSub(fault));
            }
            let subscriptions = state
                .topics
                .get(topic)
                .cloned()
                .ok_or_else(|| BridgeError::PubSub(format!("topic not found: {}", topic)))?;

            let id = state.next_id();
            for name in subscriptions {
                if let Some(sub) = state.subscriptions.get_mut(&name) {
                    sub.pending.push_back(CloudMessage {
                        id: id.clone(),
                        data: envelope.data.clone(),
                        attributes: envelope.attributes.clone(),
                    });
                }
            }
            state.published.push(PublishedMessage {
                topic: topic.to_string(),
                id: id.clone(),
                envelope,
            });
            id
        };
        debug!(topic, id = %id, "in-memory publish");
        self.shared.pushes.notify_waiters();
        Ok(id)
    }
}

/// Receives from one [`InMemoryPubSub`] subscription
pub struct InMemorySubscriber {
    shared: Arc<Shared>,
    subscription: String,
}

#[async_trait]
impl Subscriber for InMemorySubscriber {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>> {
        loop {
            let pushed = self.shared.pushes.notified();
            {
                let mut state = self.shared.state();
                let Some(sub) = state.subscriptions.get_mut(&self.subscription) else {
                    return Ok(None);
                };
                if let Some(message) = sub.pending.pop_front() {
                    let acker = InMemoryAck {
                        shared: Arc::clone(&self.shared),
                        id: message.id.clone(),
                    };
                    return Ok(Some(Delivery::new(message, Box::new(acker))));
                }
                if sub.closed {
                    return Ok(None);
                }
            }
            pushed.await;
        }
    }
}

struct InMemoryAck {
    shared: Arc<Shared>,
    id: String,
}

#[async_trait]
impl Acknowledger for InMemoryAck {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.shared.state().acked.push(self.id);
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<()> {
        self.shared.state().nacked.push(self.id);
        Ok(())
    }
}
