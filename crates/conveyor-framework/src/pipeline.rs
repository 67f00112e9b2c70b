//! The ordered incoming-step pipeline.
//!
//! Every inbound message runs through the same ordered list of named steps.
//! Each step receives the per-message [`StepContext`] and a [`Next`]
//! continuation; it may act before and after invoking the rest of the
//! pipeline, or not invoke it at all.
//!
//! The list is fixed at startup. Custom steps are inserted relative to an
//! existing *anchor* step by name:
//!
//! ```text
//! PipelineBuilder::new(activate)                      [activate-handlers]
//!     .insert(capture, Before("activate-handlers"))   [header-capture, activate-handlers]
//!     .insert(logging, Before("activate-handlers"))   [header-capture, logging, activate-handlers]
//! ```
//!
//! Inserting against an anchor that is not registered is a startup error.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use conveyor_core::{CorrelationStore, InboundMessage, headers};
use futures::future::BoxFuture;
use tracing::{Instrument, debug, debug_span};

use crate::error::{PipelineError, PipelineResult, ProcessingError};
use crate::steps::{ActivateHandlersStep, HeaderCaptureStep, LoggingStep};

/// Result of running a step (and everything after it).
pub type StepResult = Result<(), ProcessingError>;

/// A type-erased, shareable step.
pub type BoxedStep = Arc<dyn IncomingStep>;

// ============================================================================
// StepContext
// ============================================================================

/// State for one unit of work: the message being processed and its
/// correlation store.
///
/// A fresh context is created for every message, so nothing written here is
/// visible to any other message, including ones processed concurrently.
#[derive(Debug)]
pub struct StepContext {
    message: InboundMessage,
    correlation: CorrelationStore,
}

impl StepContext {
    /// Starts a unit of work with an empty correlation store.
    pub fn new(message: InboundMessage) -> Self {
        Self {
            message,
            correlation: CorrelationStore::new(),
        }
    }

    pub fn message(&self) -> &InboundMessage {
        &self.message
    }

    pub fn correlation(&self) -> &CorrelationStore {
        &self.correlation
    }

    pub fn correlation_mut(&mut self) -> &mut CorrelationStore {
        &mut self.correlation
    }

    /// Consumes the context, returning the message and the captured
    /// correlation.
    pub fn into_parts(self) -> (InboundMessage, CorrelationStore) {
        (self.message, self.correlation)
    }
}

// ============================================================================
// IncomingStep / Next
// ============================================================================

/// A named stage of inbound processing.
///
/// # Example
///
/// ```rust,ignore
/// struct Timing;
///
/// #[async_trait]
/// impl IncomingStep for Timing {
///     fn name(&self) -> &'static str {
///         "timing"
///     }
///
///     async fn process(&self, ctx: &mut StepContext, next: Next<'_>) -> StepResult {
///         let started = Instant::now();
///         let result = next.run(ctx).await;
///         debug!(elapsed = ?started.elapsed(), "Message processed");
///         result
///     }
/// }
/// ```
#[async_trait]
pub trait IncomingStep: Send + Sync + 'static {
    /// Unique name within a pipeline; used as an insertion anchor.
    fn name(&self) -> &'static str;

    /// Processes the message. Call `next.run(ctx)` to continue the pipeline.
    async fn process(&self, ctx: &mut StepContext, next: Next<'_>) -> StepResult;
}

/// The continuation handed to a step: the steps after it.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    steps: &'a [BoxedStep],
}

impl<'a> Next<'a> {
    /// Runs the remaining steps in order.
    pub fn run<'b>(self, ctx: &'b mut StepContext) -> BoxFuture<'b, StepResult>
    where
        'a: 'b,
    {
        Box::pin(async move {
            match self.steps.split_first() {
                Some((step, rest)) => step.process(ctx, Next { steps: rest }).await,
                None => Ok(()),
            }
        })
    }

    /// Number of steps left to run.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|s| s.name()))
            .finish()
    }
}

// ============================================================================
// PipelineBuilder
// ============================================================================

/// Where to insert a step, relative to a named anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativePosition {
    /// Immediately before the anchor.
    Before(&'static str),
    /// Immediately after the anchor.
    After(&'static str),
}

impl RelativePosition {
    fn anchor(&self) -> &'static str {
        match self {
            Self::Before(anchor) | Self::After(anchor) => anchor,
        }
    }
}

/// Assembles a [`Pipeline`] at startup.
pub struct PipelineBuilder {
    steps: Vec<BoxedStep>,
}

impl PipelineBuilder {
    /// Starts a pipeline containing only its terminal step, normally an
    /// [`ActivateHandlersStep`].
    pub fn new(terminal: impl IncomingStep) -> Self {
        Self {
            steps: vec![Arc::new(terminal)],
        }
    }

    /// Registers the built-in header-capture and logging steps, each
    /// immediately before handler activation, in that order.
    pub fn with_default_steps(self) -> PipelineResult<Self> {
        self.with_default_steps_using(LoggingStep::new())
    }

    /// [`with_default_steps`](Self::with_default_steps) with a configured
    /// logging step, e.g. one carrying static scope fields.
    pub fn with_default_steps_using(self, logging: LoggingStep) -> PipelineResult<Self> {
        self.insert(
            HeaderCaptureStep,
            RelativePosition::Before(ActivateHandlersStep::NAME),
        )?
        .insert(logging, RelativePosition::Before(ActivateHandlersStep::NAME))
    }

    /// Inserts `step` relative to an anchor step.
    ///
    /// Fails with [`PipelineError::UnknownAnchor`] if the anchor is not
    /// registered and [`PipelineError::DuplicateStep`] if a step with the
    /// same name already is.
    pub fn insert(self, step: impl IncomingStep, position: RelativePosition) -> PipelineResult<Self> {
        self.insert_boxed(Arc::new(step), position)
    }

    /// [`insert`](Self::insert) for an already shared step.
    pub fn insert_boxed(mut self, step: BoxedStep, position: RelativePosition) -> PipelineResult<Self> {
        let name = step.name();
        if self.contains(name) {
            return Err(PipelineError::DuplicateStep(name));
        }

        let anchor = position.anchor();
        let index = self
            .steps
            .iter()
            .position(|s| s.name() == anchor)
            .ok_or(PipelineError::UnknownAnchor { step: name, anchor })?;

        let at = match position {
            RelativePosition::Before(_) => index,
            RelativePosition::After(_) => index + 1,
        };
        debug!(step = name, ?position, "Registering pipeline step");
        self.steps.insert(at, step);
        Ok(self)
    }

    /// Returns `true` if a step with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.steps.iter().any(|s| s.name() == name)
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            steps: self.steps.into(),
        }
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// The immutable, shareable step list every message runs through.
#[derive(Clone)]
pub struct Pipeline {
    steps: Arc<[BoxedStep]>,
}

impl Pipeline {
    /// Processes one message as its own unit of work.
    pub async fn run(&self, message: InboundMessage) -> StepResult {
        let mut ctx = StepContext::new(message);
        self.run_with(&mut ctx).await
    }

    /// Processes a message with a caller-supplied context, leaving the
    /// captured correlation inspectable afterwards.
    pub async fn run_with(&self, ctx: &mut StepContext) -> StepResult {
        let span = debug_span!(
            "unit_of_work",
            message_type = ctx.message().message_type().unwrap_or("<none>"),
            message_id = ctx.message().headers.get(headers::MESSAGE_ID).unwrap_or("<none>"),
        );
        Next { steps: &self.steps }.run(ctx).instrument(span).await
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// A one-line rendering of the step order, as logged at startup.
    pub fn describe(&self) -> String {
        self.step_names().join(" -> ")
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}
