//! Procedural macros for the Conveyor message pipeline.
//!
//! This crate provides:
//!
//! - `#[derive(Message)]` - Binds a type to the `msg-type` it travels under
//! - `#[register_handler]` - Contributes a `HandleMessage` impl to link-time
//!   handler discovery
//!
//! ```rust,ignore
//! use conveyor_macros::{Message, register_handler};
//!
//! #[derive(Serialize, Deserialize, Message)]
//! #[message(name = "orders.OrderPlaced")]
//! pub struct OrderPlaced {
//!     pub order_id: u64,
//! }
//!
//! #[derive(Default)]
//! struct ShipOrder;
//!
//! #[register_handler]
//! #[async_trait]
//! impl HandleMessage<OrderPlaced> for ShipOrder {
//!     async fn handle(&self, order: OrderPlaced, ctx: &HandlerContext) -> Result<(), BoxError> {
//!         ctx.publish(&OrderShipped { order_id: order.order_id }).await?;
//!         Ok(())
//!     }
//! }
//! ```

mod handler;
mod message;

use proc_macro::TokenStream;
use syn::{DeriveInput, ItemImpl, parse_macro_input};

/// Implements `conveyor_core::Message` for a struct or enum.
///
/// # Attributes
///
/// - `#[message(name = "...")]` - The `msg-type` value (default: the type name)
/// - `#[message(crate = "...")]` - Path to `conveyor_core` (default:
///   `::conveyor_core`; use `conveyor::core` through the facade crate)
#[proc_macro_derive(Message, attributes(message))]
pub fn derive_message(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match message::derive_message(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Registers a `HandleMessage<M>` implementation in
/// `conveyor_framework::MESSAGE_HANDLERS`, so that
/// `HandlerRegistry::discover()` picks it up.
///
/// Place it above `#[async_trait]`.
///
/// # Arguments
///
/// - `constructor = "..."` - Function building the handler (default:
///   `Default::default`)
/// - `crate = "..."` - Path to `conveyor_framework` (default:
///   `::conveyor_framework`; use `conveyor::framework` through the facade crate)
#[proc_macro_attribute]
pub fn register_handler(args: TokenStream, input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as ItemImpl);

    match handler::register_handler(args.into(), &item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
