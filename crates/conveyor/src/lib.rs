//! # Conveyor
//!
//! An ordered, correlation-aware message handling pipeline for services that
//! talk over a message bus.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────── Pipeline (one unit of work) ─────────────────┐
//! │ Transport │──▶│ header-capture ─▶ logging ─▶ [your steps] ─▶ activate-handlers │──▶ handlers
//! └───────────┘   └───────────────────────────────────────────────────────────────┘       │
//!       ▲                                                                                    │
//!       └──────────────────────────── EventBus::publish ◀────────────────────────────────────┘
//! ```
//!
//! - **Runtime**: receive loops, bounded parallelism, shutdown
//! - **Steps**: ordered by anchor (`Before`/`After` a named step) at startup
//! - **Correlation**: request id, correlation context and email captured per
//!   message and stamped onto everything handlers publish
//! - **Interceptors**: pass-through logging, or conversion of failures into
//!   [`Outcome::Fail`](core::Outcome::Fail)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use conveyor::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Message)]
//! #[message(name = "orders.OrderPlaced", crate = "conveyor::core")]
//! struct OrderPlaced { order_id: u64 }
//!
//! #[derive(Default)]
//! struct ShipOrder;
//!
//! #[register_handler(crate = "conveyor::framework")]
//! #[async_trait]
//! impl HandleMessage<OrderPlaced> for ShipOrder {
//!     async fn handle(&self, order: OrderPlaced, ctx: &HandlerContext) -> Result<(), BoxError> {
//!         info!(order_id = order.order_id, "Shipping order");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     Runtime::new()?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The derive and attribute macros name `conveyor_core` / `conveyor_framework`
//! by default; pass `crate = "conveyor::core"` / `crate = "conveyor::framework"`
//! when depending on this crate alone.
//!
//! ## Features
//!
//! - `toml-config`: `conveyor.toml` configuration files (default)
//! - `yaml-config`: `conveyor.yaml` configuration files
//! - `json-log`: JSON log output

pub use conveyor_core as core;
pub use conveyor_framework as framework;
pub use conveyor_macros as macros;
pub use conveyor_runtime as runtime;

/// Commonly used types for building an endpoint.
///
/// ```rust,ignore
/// use conveyor::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use conveyor_runtime::{MemoryBroker, InMemoryTransport, Runtime, RuntimeBuilder};

    // Messages and the bus
    pub use conveyor_core::{
        BoxError, BusExt, EventBus, InboundMessage, Message, OutboundMessage, Outcome, headers,
    };
    pub use conveyor_macros::{Message, register_handler};

    // Handlers
    pub use conveyor_framework::{HandleMessage, HandlerContext, HandlerRegistry};

    // Pipeline steps
    pub use conveyor_framework::{
        ActivateHandlersStep, HeaderCaptureStep, IncomingStep, LoggingStep, Next,
        RelativePosition, StepContext, StepResult,
    };

    // Interception and projection
    pub use conveyor_framework::{
        FaultConvertLayer, FaultConvertingInterceptor, InterceptLayer, Invocation,
        PassThroughInterceptor, Projector,
    };

    pub use conveyor_runtime::prelude::*;
}
