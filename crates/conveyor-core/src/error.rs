//! Error types shared across the Conveyor crates.

use thiserror::Error;

/// A type-erased, thread-safe error.
///
/// This is the error carried by [`Outcome::Fail`](crate::Outcome::Fail) and
/// returned by message handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by a [`Transport`](crate::Transport) or the event bus facade.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport refused or failed to send a message.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Receiving from the input queue failed.
    #[error("failed to receive message: {0}")]
    ReceiveFailed(String),

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,

    /// The queue a message was addressed to does not exist.
    #[error("unknown destination queue '{0}'")]
    UnknownDestination(String),

    /// The event could not be turned into a transport message.
    #[error(transparent)]
    Message(#[from] MessageError),
}

// =============================================================================
// Message Errors
// =============================================================================

/// Errors raised while encoding or decoding message bodies and headers.
#[derive(Debug, Error)]
pub enum MessageError {
    /// A header the operation depends on is absent.
    #[error("message is missing the '{0}' header")]
    MissingHeader(&'static str),

    /// The body could not be deserialized into the requested type.
    #[error("failed to decode '{message_type}' body: {source}")]
    Decode {
        /// The declared message type.
        message_type: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The value could not be serialized into a message body.
    #[error("failed to encode message body: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for message encoding and decoding.
pub type MessageResult<T> = Result<T, MessageError>;
