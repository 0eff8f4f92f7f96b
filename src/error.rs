//! Error handling module for the nio client
//!
//! Provides the crate-level error type. Subsystems keep their own error enums
//! (`PropertyError`, `TransportError`, `TransitionError`) and convert into
//! `NioError` so callers can match on a single type.

use thiserror::Error;

use crate::poller::TransitionError;
use crate::transport::TransportError;
use crate::value::PropertyError;

/// Main error type for the nio client
#[derive(Error, Debug)]
pub enum NioError {
    /// Typed property failures (type mismatch, immutable, unknown field, schema)
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// Transport failures that survived the retry policy
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Status polling ended outside the expected state machine
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Entity operation needs a server link but the entity was never added to an instance
    #[error("{entity} is not attached to an instance")]
    NotAttached { entity: String },

    /// Entity names must be non-empty
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Block type is not advertised by the server
    #[error("Unknown block type: {0}")]
    UnknownBlockType(String),

    /// Server response had an unexpected shape
    #[error("Unexpected response from '{endpoint}': {reason}")]
    UnexpectedResponse { endpoint: String, reason: String },

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for nio client operations
pub type Result<T> = std::result::Result<T, NioError>;

// Convenient error constructors
impl NioError {
    /// Create a not-attached error for the named entity
    pub fn not_attached(entity: impl Into<String>) -> Self {
        Self::NotAttached {
            entity: entity.into(),
        }
    }

    /// Create an invalid name error
    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::InvalidName(msg.into())
    }

    /// Create an unexpected response error
    pub fn unexpected_response(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if the underlying failure was a connection error
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connection(),
            Self::Transition(TransitionError::Transport(e)) => e.is_connection(),
            _ => false,
        }
    }
}
