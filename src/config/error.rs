//! Configuration Error Types
//!
//! Specific, actionable error messages for configuration loading and
//! validation failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// A source could not be read or parsed
    #[error("Failed to load configuration from {source_name}: {error}")]
    SourceError { source_name: String, error: String },

    /// Merged configuration did not match the expected shape
    #[error("Configuration deserialization failed: {error}")]
    Deserialization { error: String },
}

impl ConfigurationError {
    pub fn missing_required_field<F: Into<String>, C: Into<String>>(field: F, context: C) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn source_error<S: Into<String>, E: std::fmt::Display>(source_name: S, error: E) -> Self {
        Self::SourceError {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::Foreign(e) => Self::source_error("source", e),
            config::ConfigError::FileParse { uri, cause } => {
                Self::source_error(uri.unwrap_or_else(|| "file".to_string()), cause)
            }
            other => Self::Deserialization {
                error: other.to_string(),
            },
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
