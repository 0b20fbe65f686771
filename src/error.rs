//! Error types for the store bridge.

use thiserror::Error;

/// Main error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("channel name is required in options")]
    MissingChannelName,

    #[error("Port error: {0}")]
    Port(#[from] PortError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

/// Failure to hand a message to a port's transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port is disconnected")]
    Disconnected,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Error raised synchronously by a store's `dispatch`.
///
/// Only its `Display` message is forwarded to the requester; the `Debug`
/// rendering goes to the local log.
pub type DispatchError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
