//! # Broker Provider Enum
//!
//! Enum dispatch over the broker backends, avoiding trait objects on the
//! publish path and keeping `ProcessingSystem` non-generic.

use futures::stream::BoxStream;
use tracing::debug;

use super::errors::{MessagingError, MessagingResult};
use super::in_memory::{InMemoryAcker, InMemoryBroker};
use super::message::QueueMessage;
use super::rabbitmq::RabbitMqBroker;
use super::topology::{ResultChannel, WorkTopic};

/// Stream of inbound result deliveries for one channel
pub type DeliveryStream = BoxStream<'static, MessagingResult<InboundDelivery>>;

#[derive(Debug)]
pub enum BrokerProvider {
    /// RabbitMQ via lapin (AMQP 0.9.1)
    RabbitMq(RabbitMqBroker),
    /// Process-local broker for tests and local runs
    InMemory(InMemoryBroker),
}

impl BrokerProvider {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::RabbitMq(_) => "rabbitmq",
            Self::InMemory(_) => "in_memory",
        }
    }

    /// Declare exchanges, queues, dead-letter routing and bindings (idempotent)
    pub async fn declare_topology(&self) -> MessagingResult<()> {
        match self {
            Self::RabbitMq(b) => b.declare_topology().await,
            Self::InMemory(b) => b.declare_topology(),
        }
    }

    /// Publish a persistent work message and wait for the broker to confirm it
    pub async fn publish<T: QueueMessage>(
        &self,
        topic: WorkTopic,
        message: &T,
    ) -> MessagingResult<()> {
        let payload = message.to_bytes()?;
        match self {
            Self::RabbitMq(b) => b.publish(topic, &payload).await,
            Self::InMemory(b) => b.publish(topic, payload),
        }
    }

    /// Start consuming a result channel
    pub async fn subscribe(&self, channel: ResultChannel) -> MessagingResult<DeliveryStream> {
        match self {
            Self::RabbitMq(b) => b.subscribe(channel).await,
            Self::InMemory(b) => b.subscribe(channel),
        }
    }

    pub async fn health_check(&self) -> MessagingResult<bool> {
        match self {
            Self::RabbitMq(b) => Ok(b.is_connected()),
            Self::InMemory(_) => Ok(true),
        }
    }
}

/// Backend handle used to settle a delivery
pub(crate) enum DeliveryAcker {
    RabbitMq(lapin::acker::Acker),
    InMemory(InMemoryAcker),
}

impl std::fmt::Debug for DeliveryAcker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RabbitMq(_) => f.write_str("DeliveryAcker::RabbitMq"),
            Self::InMemory(_) => f.write_str("DeliveryAcker::InMemory"),
        }
    }
}

/// One result message received from a broker queue
///
/// Must be settled exactly once with [`ack`](Self::ack) or
/// [`reject`](Self::reject); both consume the delivery.
#[derive(Debug)]
pub struct InboundDelivery {
    pub channel: ResultChannel,
    pub payload: Vec<u8>,
    pub redelivered: bool,
    acker: DeliveryAcker,
}

impl InboundDelivery {
    pub(crate) fn new(
        channel: ResultChannel,
        payload: Vec<u8>,
        redelivered: bool,
        acker: DeliveryAcker,
    ) -> Self {
        Self {
            channel,
            payload,
            redelivered,
            acker,
        }
    }

    pub fn decode<T: QueueMessage>(&self) -> MessagingResult<T> {
        T::from_bytes(&self.payload)
    }

    /// Payload as lossy UTF-8, for logging
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    pub async fn ack(self) -> MessagingResult<()> {
        let channel = self.channel;
        match self.acker {
            DeliveryAcker::RabbitMq(acker) => acker
                .ack(lapin::options::BasicAckOptions::default())
                .await
                .map_err(|e| MessagingError::acknowledgement(channel.to_string(), "ack", e.to_string())),
            DeliveryAcker::InMemory(acker) => {
                acker.ack(self.payload);
                Ok(())
            }
        }
    }

    /// Negative-acknowledge without requeue; the broker dead-letters it
    pub async fn reject(self) -> MessagingResult<()> {
        let channel = self.channel;
        debug!(channel = %channel, "Rejecting delivery to dead-letter queue");
        match self.acker {
            DeliveryAcker::RabbitMq(acker) => acker
                .nack(lapin::options::BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    MessagingError::acknowledgement(channel.to_string(), "nack", e.to_string())
                }),
            DeliveryAcker::InMemory(acker) => {
                acker.reject(self.payload);
                Ok(())
            }
        }
    }
}
