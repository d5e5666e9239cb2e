//! Adapter error type shared by every port

use std::fmt;

use thiserror::Error;

/// Failure reported by a store, audit sink or artifact adapter.
///
/// Gateway calls have their own classified error in the payments domain;
/// everything that persists or publishes goes through this type.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: String, id: String },

    /// A write collided with a uniqueness or reference rule
    #[error("Conflicting write: {message}")]
    Conflict { message: String },

    /// The backing system could not be reached; the call may be repeated
    #[error("Adapter unavailable: {message}")]
    Unavailable { message: String },

    /// A stored or published value could not be encoded or decoded
    #[error("Could not decode stored value: {message}")]
    Decode { message: String },

    #[error("Adapter failure: {message}")]
    Internal { message: String },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict { message: message.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        PortError::Unavailable { message: message.into() }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        PortError::Decode { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal { message: message.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    /// Only an unreachable backend is worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortError::Unavailable { .. })
    }
}
