//! Error types for the bridge.

use livesync_bridge_store::StoreError;
use thiserror::Error;

/// Errors that can occur while running peers and the hub.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Settings store error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// I/O error from a peer backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// No factory is registered for a peer type.
    #[error("unknown peer type: {0}")]
    UnknownPeerType(String),

    /// The hub stopped receiving dispatched changes.
    #[error("hub is no longer accepting changes")]
    HubClosed,
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
