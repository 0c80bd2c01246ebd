//! # In-Memory Broker
//!
//! Thread-safe stand-in for RabbitMQ used by tests and local runs.
//!
//! - Published work is recorded per topic and can be inspected or drained
//! - Publishing can be switched to fail, to exercise the publish-error path
//! - Result deliveries are injected per channel and surface on `subscribe`
//! - Acked and dead-lettered deliveries are recorded

use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::errors::{MessagingError, MessagingResult};
use super::message::{QueueMessage, WorkMessage};
use super::provider::{DeliveryAcker, DeliveryStream, InboundDelivery};
use super::topology::{ResultChannel, WorkTopic};

#[derive(Debug, Default)]
struct BrokerState {
    topology_declared: bool,
    published: Vec<(WorkTopic, Vec<u8>)>,
    publish_failure: Option<String>,
    acked: Vec<(ResultChannel, Vec<u8>)>,
    dead_lettered: Vec<(ResultChannel, Vec<u8>)>,
}

#[derive(Debug)]
struct ResultQueue {
    sender: mpsc::UnboundedSender<InboundDelivery>,
    receiver: Option<mpsc::UnboundedReceiver<InboundDelivery>>,
}

impl ResultQueue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: Mutex<BrokerState>,
    results: Mutex<HashMap<ResultChannel, ResultQueue>>,
}

/// Cheaply cloneable; clones share the same queues
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let mut results = HashMap::new();
        results.insert(ResultChannel::DocumentResults, ResultQueue::new());
        results.insert(ResultChannel::AudioResults, ResultQueue::new());

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState::default()),
                results: Mutex::new(results),
            }),
        }
    }

    pub(crate) fn declare_topology(&self) -> MessagingResult<()> {
        self.inner.state.lock().topology_declared = true;
        Ok(())
    }

    pub fn topology_declared(&self) -> bool {
        self.inner.state.lock().topology_declared
    }

    pub(crate) fn publish(&self, topic: WorkTopic, payload: Vec<u8>) -> MessagingResult<()> {
        let mut state = self.inner.state.lock();
        if let Some(reason) = &state.publish_failure {
            return Err(MessagingError::publish(topic.to_string(), reason.clone()));
        }
        state.published.push((topic, payload));
        Ok(())
    }

    pub(crate) fn subscribe(&self, channel: ResultChannel) -> MessagingResult<DeliveryStream> {
        let receiver = self
            .inner
            .results
            .lock()
            .get_mut(&channel)
            .and_then(|queue| queue.receiver.take())
            .ok_or_else(|| {
                MessagingError::consume(channel.to_string(), "channel already has a consumer")
            })?;

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|delivery| (Ok(delivery), receiver))
        });
        Ok(stream.boxed())
    }

    /// Make every subsequent publish fail with `reason`
    pub fn fail_publishes(&self, reason: impl Into<String>) {
        self.inner.state.lock().publish_failure = Some(reason.into());
    }

    pub fn restore_publishes(&self) {
        self.inner.state.lock().publish_failure = None;
    }

    /// Deliver a worker result on `channel`
    pub fn inject_result<T: QueueMessage>(
        &self,
        channel: ResultChannel,
        message: &T,
    ) -> MessagingResult<()> {
        self.inject_raw(channel, message.to_bytes()?)
    }

    /// Deliver raw bytes on `channel`, e.g. a malformed payload
    pub fn inject_raw(&self, channel: ResultChannel, payload: Vec<u8>) -> MessagingResult<()> {
        let acker = DeliveryAcker::InMemory(InMemoryAcker {
            channel,
            broker: self.clone(),
        });
        let delivery = InboundDelivery::new(channel, payload, false, acker);

        let results = self.inner.results.lock();
        let queue = results
            .get(&channel)
            .ok_or_else(|| MessagingError::queue_not_found(channel.to_string()))?;
        queue
            .sender
            .send(delivery)
            .map_err(|_| MessagingError::consume(channel.to_string(), "consumer dropped"))
    }

    /// Close both result channels, ending their subscriptions
    pub fn close_results(&self) {
        let mut results = self.inner.results.lock();
        for channel in [ResultChannel::DocumentResults, ResultChannel::AudioResults] {
            let (closed, _) = mpsc::unbounded_channel();
            if let Some(queue) = results.get_mut(&channel) {
                queue.sender = closed;
            }
        }
    }

    /// Work messages published so far on `topic`, oldest first
    pub fn published(&self, topic: WorkTopic) -> Vec<WorkMessage> {
        self.inner
            .state
            .lock()
            .published
            .iter()
            .filter(|(t, _)| *t == topic)
            .filter_map(|(_, payload)| WorkMessage::from_bytes(payload).ok())
            .collect()
    }

    /// Every published work message in publish order
    pub fn published_all(&self) -> Vec<WorkMessage> {
        self.inner
            .state
            .lock()
            .published
            .iter()
            .filter_map(|(_, payload)| WorkMessage::from_bytes(payload).ok())
            .collect()
    }

    pub fn acked_count(&self, channel: ResultChannel) -> usize {
        self.inner
            .state
            .lock()
            .acked
            .iter()
            .filter(|(c, _)| *c == channel)
            .count()
    }

    /// Payloads rejected to the dead-letter queue
    pub fn dead_lettered(&self, channel: ResultChannel) -> Vec<Vec<u8>> {
        self.inner
            .state
            .lock()
            .dead_lettered
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Total deliveries settled either way
    pub fn settled_count(&self) -> usize {
        let state = self.inner.state.lock();
        state.acked.len() + state.dead_lettered.len()
    }
}

pub(crate) struct InMemoryAcker {
    channel: ResultChannel,
    broker: InMemoryBroker,
}

impl InMemoryAcker {
    pub(crate) fn ack(self, payload: Vec<u8>) {
        self.broker
            .inner
            .state
            .lock()
            .acked
            .push((self.channel, payload));
    }

    pub(crate) fn reject(self, payload: Vec<u8>) {
        self.broker
            .inner
            .state
            .lock()
            .dead_lettered
            .push((self.channel, payload));
    }
}
