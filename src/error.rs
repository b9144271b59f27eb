//! Replcheck Error Types

use thiserror::Error;

/// Result type alias for replcheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Replcheck error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid targets file: {0}")]
    TopologyParse(#[from] serde_json::Error),

    // Role errors
    #[error("Configured primary {0} reports itself as a replica")]
    PrimaryRoleMismatch(String),

    #[error("Configured replica {0} reports itself as a primary")]
    ReplicaRoleMismatch(String),

    // Network errors
    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    // Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error: {0}")]
    Server(String),

    // Bounded-wait errors
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is a per-node failure that a sibling check can
    /// safely outlive, as opposed to a setup error that aborts the run
    pub fn is_node_local(&self) -> bool {
        matches!(
            self,
            Error::ReplicaRoleMismatch(_)
                | Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout(_)
                | Error::Timeout(_)
                | Error::Cancelled
        )
    }
}
