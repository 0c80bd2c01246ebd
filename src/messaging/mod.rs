//! # Messaging Module
//!
//! Broker bridge: publishes work messages to topic exchanges with dead-letter
//! routing and consumes asynchronous worker results from the result queues.

pub mod errors;
pub mod in_memory;
pub mod message;
pub mod provider;
pub mod rabbitmq;
pub mod topology;

pub use errors::{MessagingError, MessagingResult};
pub use in_memory::InMemoryBroker;
pub use message::{
    extract_text, AudioProcessingMessage, DocumentProcessingMessage, DocumentResultStatus,
    ProcessingResultMessage, QueueMessage, TranscriptionResultMessage, TranscriptionStatus,
    WorkMessage,
};
pub use provider::{BrokerProvider, DeliveryStream, InboundDelivery};
pub use rabbitmq::RabbitMqBroker;
pub use topology::{BrokerTopology, ResultChannel, Route, WorkTopic};
