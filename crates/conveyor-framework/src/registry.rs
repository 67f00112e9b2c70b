//! Handler registry and link-time handler discovery.
//!
//! Handlers are registered explicitly through [`HandlerRegistry::register`]
//! or contributed at link time to the [`MESSAGE_HANDLERS`] distributed slice,
//! usually through `#[register_handler]` from `conveyor-macros`.
//! [`HandlerRegistry::discover`] runs every contributed registration
//! function; nothing is discovered by reflection.

use std::collections::HashMap;
use std::future::Future;

use conveyor_core::{BoxError, Message};
use linkme::distributed_slice;
use tracing::debug;

use crate::handler::{BoxedHandler, HandleMessage, HandlerContext, HandlerFn, into_handler};

/// Registration functions contributed by handler crates.
///
/// ```rust,ignore
/// #[distributed_slice(conveyor_framework::MESSAGE_HANDLERS)]
/// #[linkme(crate = conveyor_framework::linkme)]
/// static SHIP_ORDER: fn(&mut HandlerRegistry) = |registry| {
///     registry.register::<OrderPlaced, _>(ShipOrder);
/// };
/// ```
#[distributed_slice]
pub static MESSAGE_HANDLERS: [fn(&mut HandlerRegistry)];

/// Message type → handlers, in registration order.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Vec<BoxedHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from every registration in [`MESSAGE_HANDLERS`].
    pub fn discover() -> Self {
        let mut registry = Self::new();
        registry.discover_into();
        registry
    }

    /// Runs every registration in [`MESSAGE_HANDLERS`] against this registry.
    pub fn discover_into(&mut self) -> &mut Self {
        for register in MESSAGE_HANDLERS {
            register(self);
        }
        debug!(
            contributions = MESSAGE_HANDLERS.len(),
            handlers = self.handler_count(),
            "Discovered message handlers"
        );
        self
    }

    /// Registers a handler for messages of type `M`.
    pub fn register<M, H>(&mut self, handler: H) -> &mut Self
    where
        M: Message,
        H: HandleMessage<M>,
    {
        self.register_boxed(into_handler::<M, H>(handler))
    }

    /// Registers an async closure as a handler for messages of type `M`.
    pub fn register_fn<M, F, Fut>(&mut self, f: F) -> &mut Self
    where
        M: Message,
        F: Fn(M, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.register::<M, _>(HandlerFn::new(f))
    }

    /// Registers an already erased handler.
    pub fn register_boxed(&mut self, handler: BoxedHandler) -> &mut Self {
        debug!(
            message_type = handler.message_type(),
            handler = handler.handler_name(),
            "Registering message handler"
        );
        self.handlers
            .entry(handler.message_type())
            .or_default()
            .push(handler);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<M, H>(mut self, handler: H) -> Self
    where
        M: Message,
        H: HandleMessage<M>,
    {
        self.register::<M, H>(handler);
        self
    }

    /// Handlers for a message type, in registration order.
    pub fn handlers_for(&self, message_type: &str) -> &[BoxedHandler] {
        self.handlers
            .get(message_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Message types with at least one handler.
    pub fn message_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// Total number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (message_type, handlers) in &self.handlers {
            map.entry(
                message_type,
                &handlers.iter().map(|h| h.handler_name()).collect::<Vec<_>>(),
            );
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Ping;

    impl Message for Ping {
        const MESSAGE_TYPE: &'static str = "registry.Ping";
    }

    #[derive(Serialize, Deserialize)]
    struct Discovered;

    impl Message for Discovered {
        const MESSAGE_TYPE: &'static str = "registry.Discovered";
    }

    struct Noop;

    #[async_trait]
    impl HandleMessage<Ping> for Noop {
        async fn handle(&self, _message: Ping, _ctx: &HandlerContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[async_trait]
    impl HandleMessage<Discovered> for Noop {
        async fn handle(&self, _message: Discovered, _ctx: &HandlerContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[distributed_slice(MESSAGE_HANDLERS)]
    static REGISTER_NOOP: fn(&mut HandlerRegistry) = |registry| {
        registry.register::<Discovered, _>(Noop);
    };

    #[test]
    fn test_handlers_kept_in_registration_order() {
        let mut registry = HandlerRegistry::new();
        registry
            .register::<Ping, _>(Noop)
            .register_fn(|_: Ping, _| async { Ok(()) });

        let handlers = registry.handlers_for(Ping::MESSAGE_TYPE);
        assert_eq!(handlers.len(), 2);
        assert!(handlers[0].handler_name().ends_with("Noop"));
        assert!(handlers[1].handler_name().contains("HandlerFn"));
        assert!(registry.handlers_for("registry.Unknown").is_empty());
    }

    #[test]
    fn test_discover_runs_linked_registrations() {
        let registry = HandlerRegistry::discover();
        assert_eq!(registry.handlers_for(Discovered::MESSAGE_TYPE).len(), 1);
        assert!(registry.message_types().any(|t| t == Discovered::MESSAGE_TYPE));
    }
}
