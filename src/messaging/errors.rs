//! # Messaging Error Types
//!
//! Structured errors for the broker bridge using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Topology declaration failed: {name}: {message}")]
    TopologyDeclaration { name: String, message: String },

    #[error("Publish failed: {destination}: {message}")]
    Publish { destination: String, message: String },

    #[error("Publish negatively confirmed by broker: {destination}")]
    PublishNacked { destination: String },

    #[error("Consume failed: {queue_name}: {message}")]
    Consume { queue_name: String, message: String },

    #[error("Acknowledgement failed: {queue_name}: {operation}: {message}")]
    Acknowledgement {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },
}

impl MessagingError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn topology(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TopologyDeclaration {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn publish(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            destination: destination.into(),
            message: message.into(),
        }
    }

    pub fn consume(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consume {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn acknowledgement(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Acknowledgement {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Conversion from lapin::Error to MessagingError
impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        MessagingError::connection(err.to_string())
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messaging_error_creation() {
        let err = MessagingError::publish("document_processing_exchange", "channel closed");
        assert!(matches!(err, MessagingError::Publish { .. }));
        assert_eq!(
            err.to_string(),
            "Publish failed: document_processing_exchange: channel closed"
        );
    }

    #[test]
    fn test_error_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json").unwrap_err();
        let messaging_err: MessagingError = json_err.into();
        assert!(matches!(
            messaging_err,
            MessagingError::MessageDeserialization { .. }
        ));
    }

    #[test]
    fn test_error_display() {
        let err = MessagingError::PublishNacked {
            destination: "audio_processing_exchange".to_string(),
        };
        let display_str = format!("{err}");
        assert!(display_str.contains("negatively confirmed"));
        assert!(display_str.contains("audio_processing_exchange"));
    }
}
