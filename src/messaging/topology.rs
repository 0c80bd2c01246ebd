//! # Broker Topology
//!
//! Exchange, queue and routing-key names for both work topics and both
//! result channels. Every name is configurable; defaults match the worker
//! deployment.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outbound work destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTopic {
    DocumentProcessing,
    AudioProcessing,
}

impl fmt::Display for WorkTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DocumentProcessing => write!(f, "document-processing"),
            Self::AudioProcessing => write!(f, "audio-processing"),
        }
    }
}

/// Inbound result source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultChannel {
    DocumentResults,
    AudioResults,
}

impl fmt::Display for ResultChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DocumentResults => write!(f, "document-results"),
            Self::AudioResults => write!(f, "audio-results"),
        }
    }
}

/// Exchange/routing-key pair a work message is published to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    pub exchange: &'a str,
    pub routing_key: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerTopology {
    pub document_exchange: String,
    pub document_routing_key: String,
    pub document_queue: String,

    pub audio_exchange: String,
    pub audio_routing_key: String,
    pub audio_queue: String,

    pub dlq_exchange: String,
    pub dlq_routing_key: String,
    pub dlq_queue: String,

    pub document_result_exchange: String,
    pub document_result_routing_keys: Vec<String>,
    pub document_result_queue: String,

    pub audio_result_exchange: String,
    pub audio_result_routing_key: String,
    pub audio_result_queue: String,
}

impl Default for BrokerTopology {
    fn default() -> Self {
        Self {
            document_exchange: "document.exchange".to_string(),
            document_routing_key: "document.process".to_string(),
            document_queue: "document.processing.queue".to_string(),

            audio_exchange: "interrogation.exchange".to_string(),
            audio_routing_key: "interrogation.process".to_string(),
            audio_queue: "interrogation.processing.queue".to_string(),

            dlq_exchange: "document.dlq.exchange".to_string(),
            dlq_routing_key: "document.dlq".to_string(),
            dlq_queue: "document.dlq".to_string(),

            document_result_exchange: "document.result.exchange".to_string(),
            document_result_routing_keys: vec![
                "document.result.processing".to_string(),
                "document.result.success".to_string(),
                "document.result.failure".to_string(),
            ],
            document_result_queue: "document.result.queue".to_string(),

            audio_result_exchange: "interrogation.result.exchange".to_string(),
            audio_result_routing_key: "interrogation.result.transcribed".to_string(),
            audio_result_queue: "interrogation.result.queue".to_string(),
        }
    }
}

impl BrokerTopology {
    pub fn route(&self, topic: WorkTopic) -> Route<'_> {
        match topic {
            WorkTopic::DocumentProcessing => Route {
                exchange: &self.document_exchange,
                routing_key: &self.document_routing_key,
            },
            WorkTopic::AudioProcessing => Route {
                exchange: &self.audio_exchange,
                routing_key: &self.audio_routing_key,
            },
        }
    }

    /// Queue bound to a work topic's exchange
    pub fn work_queue(&self, topic: WorkTopic) -> &str {
        match topic {
            WorkTopic::DocumentProcessing => &self.document_queue,
            WorkTopic::AudioProcessing => &self.audio_queue,
        }
    }

    pub fn result_queue(&self, channel: ResultChannel) -> &str {
        match channel {
            ResultChannel::DocumentResults => &self.document_result_queue,
            ResultChannel::AudioResults => &self.audio_result_queue,
        }
    }

    /// `(exchange, routing keys, queue)` for a result channel
    pub fn result_bindings(&self, channel: ResultChannel) -> (&str, Vec<&str>, &str) {
        match channel {
            ResultChannel::DocumentResults => (
                self.document_result_exchange.as_str(),
                self.document_result_routing_keys
                    .iter()
                    .map(String::as_str)
                    .collect(),
                self.document_result_queue.as_str(),
            ),
            ResultChannel::AudioResults => (
                self.audio_result_exchange.as_str(),
                vec![self.audio_result_routing_key.as_str()],
                self.audio_result_queue.as_str(),
            ),
        }
    }

    /// Every queue name, for validation
    pub fn queue_names(&self) -> Vec<&str> {
        vec![
            self.document_queue.as_str(),
            self.audio_queue.as_str(),
            self.dlq_queue.as_str(),
            self.document_result_queue.as_str(),
            self.audio_result_queue.as_str(),
        ]
    }
}
