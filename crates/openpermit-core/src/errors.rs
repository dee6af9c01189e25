//! Error taxonomy for the permit bridge
//!
//! Outbound operations surface a [`BridgeError`] to the workflow caller.
//! Inbound handling never returns one; it logs and drops instead.

use crate::effects::{MediaError, ShapeError, TransportError};
use crate::identifiers::PermitId;

/// Errors raised while building or parsing event documents
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Event type is not one of the known permit event kinds
    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    /// Inbound document could not be read as a permit event
    #[error("Parse error: {0}")]
    Parse(String),
}

impl CodecError {
    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

/// Caller-facing error for bridge operations
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Login failed or the session was revoked
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The permit room could not be joined or created
    #[error("Room unavailable for permit {permit_id}: {cause}")]
    RoomUnavailable {
        /// Permit whose room could not be resolved
        permit_id: PermitId,
        /// Underlying transport failure
        cause: TransportError,
    },

    /// Event type is not one of the known permit event kinds
    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    /// Document could not be parsed as a permit event
    #[error("Parse error: {0}")]
    Parse(String),

    /// Event failed shape conformance; nothing was sent
    #[error("Event rejected by shape validation: {diagnostics}")]
    ValidationRejected {
        /// Conformance diagnostics
        diagnostics: String,
    },

    /// Transport failed while sending an already validated event
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Media collaborator failed; the error kind is preserved
    #[error(transparent)]
    Media(#[from] MediaError),

    /// Shape set could not be loaded
    #[error(transparent)]
    Shapes(#[from] ShapeError),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error means the session can no longer be used
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<CodecError> for BridgeError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedEventType(kind) => Self::UnsupportedEventType(kind),
            CodecError::Parse(message) => Self::Parse(message),
        }
    }
}

impl From<TransportError> for BridgeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Auth(reason) => Self::Auth(reason),
            other => Self::Transport(other),
        }
    }
}

/// Standard result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
