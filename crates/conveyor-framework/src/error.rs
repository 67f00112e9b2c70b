//! Error types for the Conveyor framework.

use conveyor_core::{BoxError, MessageError};
use thiserror::Error;

/// Configuration errors raised while assembling a [`Pipeline`](crate::Pipeline).
///
/// These surface from the builder at startup, before any message is
/// processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The anchor named by a relative insertion is not in the pipeline.
    #[error("cannot insert step '{step}': anchor step '{anchor}' is not registered")]
    UnknownAnchor {
        /// Step being inserted.
        step: &'static str,
        /// Missing anchor.
        anchor: &'static str,
    },

    /// A step with the same name is already registered.
    #[error("step '{0}' is already registered in the pipeline")]
    DuplicateStep(&'static str),
}

/// Result type for pipeline assembly.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while processing one inbound message.
///
/// None of these are recovered by the pipeline; they propagate to the
/// transport, which decides on redelivery or dead-lettering.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// A custom step failed.
    #[error("step '{step}' failed: {source}")]
    Step {
        /// Name of the failing step.
        step: &'static str,
        /// Underlying error.
        source: BoxError,
    },

    /// A message handler returned an error.
    #[error("handler '{handler}' for '{message_type}' failed: {source}")]
    Handler {
        /// Declared message type.
        message_type: String,
        /// Type name of the failing handler.
        handler: &'static str,
        /// Underlying error.
        source: BoxError,
    },

    /// No handler is registered for the message type.
    #[error("message of type '{0}' could not be dispatched to any handlers")]
    NoHandlers(String),

    /// The message is malformed: a required header is missing or the body
    /// does not decode.
    #[error(transparent)]
    Message(#[from] MessageError),
}

impl ProcessingError {
    /// Wraps an arbitrary error raised by the named step.
    pub fn step(step: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Step {
            step,
            source: source.into(),
        }
    }
}

/// Raised in place of a panic caught at a fault-converting boundary.
#[derive(Debug, Clone, Error)]
#[error("call panicked: {0}")]
pub struct CallPanicked(pub String);

impl CallPanicked {
    /// Extracts the panic message from a `catch_unwind` payload.
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };
        Self(message)
    }
}

/// Errors raised by a [`Projector`](crate::Projector).
#[derive(Debug, Clone, Error)]
pub enum ProjectionError {
    /// No registered projection accepted the outcome.
    #[error("no projection matched the {0} outcome")]
    Unmatched(&'static str),
}
