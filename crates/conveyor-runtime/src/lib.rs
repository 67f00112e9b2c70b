//! Conveyor Runtime: the hosting layer of a Conveyor endpoint.
//!
//! This crate provides:
//! - Layered configuration (`conveyor.toml`, `CONVEYOR_*` environment variables)
//! - `tracing` subscriber setup driven by that configuration
//! - The [`Runtime`], which runs receive loops over a [`Transport`] and feeds
//!   every message through the step pipeline
//! - [`MemoryBroker`] / [`InMemoryTransport`], an in-process transport for
//!   tests and single-process deployments
//!
//! ```ignore
//! use conveyor_runtime::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::new()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! [`Transport`]: conveyor_core::Transport

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod transport;

pub use config::{BusConfig, ConfigError, ConfigLoader, ConfigResult, ConveyorConfig, LoggingConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{Runtime, RuntimeBuilder};
pub use transport::{InMemoryTransport, MemoryBroker};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
