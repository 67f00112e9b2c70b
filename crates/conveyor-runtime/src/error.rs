//! Runtime error types.

use conveyor_framework::PipelineError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while assembling or running an endpoint.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A step could not be placed in the pipeline.
    #[error("Failed to assemble pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    /// No transport was supplied and the configured address has no built-in one.
    #[error("No transport available for bus address '{0}'")]
    UnsupportedAddress(String),

    /// `run` was called on a runtime that has already run.
    #[error("Runtime has already been started")]
    AlreadyStarted,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
