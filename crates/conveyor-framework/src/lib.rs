//! # Conveyor Framework
//!
//! The message-handling pipeline built on top of `conveyor-core`.
//!
//! This layer provides:
//! - The ordered [`Pipeline`] of named [`IncomingStep`]s, with relative
//!   (before/after) step insertion checked at startup
//! - The built-in steps: header capture, logging and handler activation
//! - The [`HandleMessage`] trait and the [`HandlerRegistry`] that
//!   activation dispatches through, including link-time handler discovery
//! - Call interception: pass-through logging and fault conversion into
//!   [`Outcome`](conveyor_core::Outcome), as plain wrappers and as tower layers
//! - Result projection onto transport-level responses
//!
//! ```text
//! InboundMessage ─▶ header-capture ─▶ logging ─▶ activate-handlers ─▶ handlers
//!                        │                 │                              │
//!                        └─ CorrelationStore ┘                   intercepted calls
//! ```

pub mod error;
pub mod handler;
pub mod intercept;
pub mod pipeline;
pub mod projection;
pub mod registry;
pub mod steps;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{CallPanicked, PipelineError, PipelineResult, ProcessingError, ProjectionError};
pub use handler::{BoxedHandler, ErasedHandler, HandleMessage, HandlerContext, HandlerFn, into_handler};
pub use intercept::{
    CallShape, FaultConvertLayer, FaultConvertingInterceptor, InterceptLayer, IntoOutcome,
    Invocation, PassThroughInterceptor, capture, capture_async,
};
pub use pipeline::{
    BoxedStep, IncomingStep, Next, Pipeline, PipelineBuilder, RelativePosition, StepContext,
    StepResult,
};
pub use projection::{
    FailProjection, ProjectedResponse, Projector, ResultProjection, STATUS_FAILED, STATUS_OK,
    SuccessProjection, project,
};
pub use registry::{HandlerRegistry, MESSAGE_HANDLERS};
pub use steps::{ActivateHandlersStep, HeaderCaptureStep, LoggingStep};

// Re-exported so handler crates can contribute to `MESSAGE_HANDLERS`
// without depending on linkme themselves.
pub use linkme;
