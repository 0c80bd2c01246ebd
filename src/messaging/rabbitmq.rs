//! # RabbitMQ Broker
//!
//! AMQP 0.9.1 bridge built on `lapin`.
//!
//! ## Topology
//!
//! | Purpose | Exchange | Queue |
//! |---------|----------|-------|
//! | Document work | `document.exchange` | `document.processing.queue` (DLX) |
//! | Audio work | `interrogation.exchange` | `interrogation.processing.queue` (DLX) |
//! | Dead letters | `document.dlq.exchange` | `document.dlq` |
//! | Document results | `document.result.exchange` | `document.result.queue` (DLX) |
//! | Audio results | `interrogation.result.exchange` | `interrogation.result.queue` (DLX) |
//!
//! All exchanges are durable `direct` exchanges and every queue is durable.
//! Publishing runs on a channel in confirm mode, so a publish only succeeds once
//! the broker has taken responsibility for the message.

use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info, instrument};

use super::errors::{MessagingError, MessagingResult};
use super::provider::{DeliveryAcker, DeliveryStream, InboundDelivery};
use super::topology::{BrokerTopology, ResultChannel, WorkTopic};
use crate::config::RabbitMqConfig;

pub struct RabbitMqBroker {
    connection: Connection,
    /// Confirm-mode channel used for declarations and publishing
    channel: Channel,
    config: RabbitMqConfig,
    topology: BrokerTopology,
}

impl std::fmt::Debug for RabbitMqBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitMqBroker")
            .field("url", &self.connection_url_redacted())
            .field("prefetch_count", &self.config.prefetch_count)
            .field("topology", &self.topology)
            .finish()
    }
}

impl RabbitMqBroker {
    pub async fn connect(config: RabbitMqConfig, topology: BrokerTopology) -> MessagingResult<Self> {
        let connection = Connection::connect(
            &config.url,
            ConnectionProperties::default()
                .with_connection_name(config.connection_name.clone().into()),
        )
        .await
        .map_err(|e| MessagingError::connection(format!("RabbitMQ connection failed: {e}")))?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {e}"))
        })?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| {
                MessagingError::configuration("rabbitmq", format!("Failed to enable confirms: {e}"))
            })?;

        let broker = Self {
            connection,
            channel,
            config,
            topology,
        };
        info!(url = broker.connection_url_redacted(), "Connected to RabbitMQ");
        Ok(broker)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub fn topology(&self) -> &BrokerTopology {
        &self.topology
    }

    /// Connection URL with credentials removed
    pub fn connection_url_redacted(&self) -> &str {
        if self.config.url.contains('@') {
            if let Some(scheme_end) = self.config.url.find("://") {
                return &self.config.url[..scheme_end + 3];
            }
        }
        "amqp://..."
    }

    async fn declare_exchange(&self, name: &str) -> MessagingResult<()> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::topology(name, format!("Exchange declaration failed: {e}")))
    }

    async fn declare_queue(&self, name: &str, arguments: FieldTable) -> MessagingResult<()> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                arguments,
            )
            .await
            .map(|_| ())
            .map_err(|e| MessagingError::topology(name, format!("Queue declaration failed: {e}")))
    }

    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> MessagingResult<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MessagingError::topology(queue, format!("Binding to {exchange}/{routing_key} failed: {e}"))
            })
    }

    /// Queue arguments routing rejected messages to the dead-letter exchange
    fn dead_letter_arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(self.topology.dlq_exchange.clone().into()),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(self.topology.dlq_routing_key.clone().into()),
        );
        args
    }

    #[instrument(skip(self))]
    pub async fn declare_topology(&self) -> MessagingResult<()> {
        let topology = &self.topology;

        // Dead letters first so the work queues can reference them
        self.declare_exchange(&topology.dlq_exchange).await?;
        self.declare_queue(&topology.dlq_queue, FieldTable::default())
            .await?;
        self.bind(
            &topology.dlq_queue,
            &topology.dlq_exchange,
            &topology.dlq_routing_key,
        )
        .await?;

        for topic in [WorkTopic::DocumentProcessing, WorkTopic::AudioProcessing] {
            let route = topology.route(topic);
            let queue = topology.work_queue(topic);
            self.declare_exchange(route.exchange).await?;
            self.declare_queue(queue, self.dead_letter_arguments())
                .await?;
            self.bind(queue, route.exchange, route.routing_key).await?;
        }

        for channel in [ResultChannel::DocumentResults, ResultChannel::AudioResults] {
            let (exchange, routing_keys, queue) = topology.result_bindings(channel);
            self.declare_exchange(exchange).await?;
            self.declare_queue(queue, self.dead_letter_arguments())
                .await?;
            for routing_key in routing_keys {
                self.bind(queue, exchange, routing_key).await?;
            }
        }

        info!("RabbitMQ topology declared");
        Ok(())
    }

    pub async fn publish(&self, topic: WorkTopic, payload: &[u8]) -> MessagingResult<()> {
        let route = self.topology.route(topic);

        let confirm = self
            .channel
            .basic_publish(
                route.exchange,
                route.routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| MessagingError::publish(route.exchange, e.to_string()))?;

        let confirmation = confirm.await.map_err(|e| {
            MessagingError::publish(route.exchange, format!("Publish confirmation failed: {e}"))
        })?;

        if let Confirmation::Nack(_) = confirmation {
            return Err(MessagingError::PublishNacked {
                destination: route.exchange.to_string(),
            });
        }

        debug!(
            exchange = route.exchange,
            routing_key = route.routing_key,
            bytes = payload.len(),
            "Published work message"
        );
        Ok(())
    }

    /// Consume a result queue on a dedicated channel with the configured prefetch
    pub async fn subscribe(&self, channel: ResultChannel) -> MessagingResult<DeliveryStream> {
        let queue = self.topology.result_queue(channel).to_string();

        let consumer_channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| MessagingError::consume(&queue, format!("Channel creation failed: {e}")))?;

        consumer_channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| {
                MessagingError::configuration("rabbitmq", format!("Failed to set QoS: {e}"))
            })?;

        let consumer_tag = format!("{}-{}", self.config.connection_name, channel);
        let consumer = consumer_channel
            .basic_consume(
                &queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::consume(&queue, e.to_string()))?;

        info!(queue = %queue, consumer_tag = %consumer_tag, "Subscribed to result queue");

        let stream = consumer.map(move |delivery| {
            // Keep the consumer channel open for the life of the stream
            let _channel = &consumer_channel;
            delivery
                .map(|delivery| {
                    InboundDelivery::new(
                        channel,
                        delivery.data,
                        delivery.redelivered,
                        DeliveryAcker::RabbitMq(delivery.acker),
                    )
                })
                .map_err(|e| MessagingError::consume(&queue, e.to_string()))
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Requires a running broker; set RABBITMQ_URL to enable
    #[tokio::test]
    #[ignore = "requires RabbitMQ (set RABBITMQ_URL)"]
    async fn test_declare_and_publish_against_live_broker() {
        let Ok(url) = std::env::var("RABBITMQ_URL") else {
            return;
        };
        let config = RabbitMqConfig {
            url,
            ..RabbitMqConfig::default()
        };
        let broker = RabbitMqBroker::connect(config, BrokerTopology::default())
            .await
            .expect("connect");
        broker.declare_topology().await.expect("declare");
        assert!(broker.is_connected());

        broker
            .publish(WorkTopic::DocumentProcessing, br#"{"ping":true}"#)
            .await
            .expect("publish");
    }
}
