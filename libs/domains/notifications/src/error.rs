//! Error types for the notifications domain.

use crate::models::Channel;
use core_config::ConfigError;
use stream_worker::StreamError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Request failed validation before anything was persisted.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// No template matches the given key or id.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(Uuid),

    /// A template with the same key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transport or authentication failure while sending.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("No provider registered for channel '{0}'")]
    UnsupportedChannel(Channel),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        NotificationError::Database(err.to_string())
    }
}

impl From<StreamError> for NotificationError {
    fn from(err: StreamError) -> Self {
        NotificationError::Queue(err.to_string())
    }
}

impl From<ConfigError> for NotificationError {
    fn from(err: ConfigError) -> Self {
        NotificationError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for NotificationError {
    fn from(err: validator::ValidationErrors) -> Self {
        NotificationError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Internal(format!("JSON serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_channel_message() {
        let err = NotificationError::UnsupportedChannel(Channel::Email);
        assert_eq!(err.to_string(), "No provider registered for channel 'email'");
    }

    #[test]
    fn test_stream_error_maps_to_queue() {
        let err: NotificationError = StreamError::Closed.into();
        assert!(matches!(err, NotificationError::Queue(_)));
    }

    #[test]
    fn test_config_error_maps_to_config() {
        let err: NotificationError = ConfigError::MissingEnvVar("SMTP_HOST".to_string()).into();
        assert!(matches!(err, NotificationError::Config(ref msg) if msg.contains("SMTP_HOST")));
    }
}
