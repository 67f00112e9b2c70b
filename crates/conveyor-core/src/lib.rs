//! # Conveyor Core
//!
//! The foundation types of the Conveyor message pipeline.
//!
//! This crate holds everything that both the pipeline and the business code
//! depend on, without pulling in the pipeline itself:
//!
//! - **Messages**: [`InboundMessage`], [`OutboundMessage`], [`Headers`] and the
//!   [`Message`] trait that ties a Rust type to its wire name
//! - **Correlation**: the per-unit-of-work [`CorrelationStore`]
//! - **Outcomes**: the two-variant [`Outcome<T>`] used as the return channel of
//!   operations that can fail
//! - **Bus**: the [`Transport`] seam and the narrow [`EventBus`] facade that
//!   handlers publish through
//!
//! ```text
//! ┌───────────┐  InboundMessage   ┌──────────┐   HandlerContext   ┌─────────┐
//! │ Transport │──────────────────▶│ Pipeline │───────────────────▶│ Handler │
//! └───────────┘                   └──────────┘                    └────┬────┘
//!       ▲                                                              │
//!       └──────────────── OutboundMessage ◀── EventBus::publish ───────┘
//! ```

pub mod bus;
pub mod correlation;
pub mod error;
pub mod message;
pub mod outcome;

pub use bus::{Bus, BusExt, EventBus, Transport};
pub use correlation::CorrelationStore;
pub use error::{BoxError, MessageError, MessageResult, TransportError, TransportResult};
pub use message::{Headers, InboundMessage, Message, OutboundMessage, headers};
pub use outcome::Outcome;
