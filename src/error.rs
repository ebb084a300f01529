//! Error types for the state container.

use thiserror::Error;

/// Main error type for container operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Error loading state from storage key '{key}': {source}")]
    Load {
        key: String,
        #[source]
        source: LoadError,
    },

    #[error("Storage error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Persist worker is not running")]
    WorkerStopped,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a load from storage failed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("storage read failed: {0}")]
    Gateway(#[source] GatewayError),

    #[error("malformed snapshot: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Errors raised by a persistence gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

/// Failure reported by a subscriber while handling a change notice.
#[derive(Debug, Error)]
#[error("Subscriber failed: {0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    pub fn new(message: impl Into<String>) -> Self {
        SubscriberError(message.into())
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, StateError>;
