//! Message handlers.
//!
//! A handler is business code reacting to one message type. It implements
//! [`HandleMessage<M>`] for the typed message `M`, or is a plain async
//! closure wrapped in a [`HandlerFn`]. The registry stores handlers
//! type-erased behind [`ErasedHandler`], which decodes the body into `M`
//! before calling through.
//!
//! # Example
//!
//! ```rust,ignore
//! struct ShipOrder;
//!
//! #[async_trait]
//! impl HandleMessage<OrderPlaced> for ShipOrder {
//!     async fn handle(&self, order: OrderPlaced, ctx: &HandlerContext) -> Result<(), BoxError> {
//!         ctx.publish(&OrderShipped { order_id: order.order_id }).await?;
//!         Ok(())
//!     }
//! }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use conveyor_core::{
    BoxError, CorrelationStore, EventBus, Headers, InboundMessage, Message, OutboundMessage,
    TransportResult, headers,
};
use futures::future::BoxFuture;

use crate::error::ProcessingError;

// ============================================================================
// HandlerContext
// ============================================================================

/// What a handler can see of its unit of work.
///
/// Cheap to clone; every handler for the same message shares one context.
#[derive(Clone)]
pub struct HandlerContext {
    headers: Arc<Headers>,
    correlation: Arc<CorrelationStore>,
    bus: Arc<dyn EventBus>,
}

impl HandlerContext {
    pub fn new(headers: Headers, correlation: CorrelationStore, bus: Arc<dyn EventBus>) -> Self {
        Self {
            headers: Arc::new(headers),
            correlation: Arc::new(correlation),
            bus,
        }
    }

    /// Raw headers of the message being handled.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Correlation captured for this unit of work.
    pub fn correlation(&self) -> &CorrelationStore {
        &self.correlation
    }

    /// Declared type of the message being handled.
    pub fn message_type(&self) -> Option<&str> {
        self.headers.get(headers::MESSAGE_TYPE)
    }

    /// Address of the endpoint that sent the message.
    pub fn sender(&self) -> Option<&str> {
        self.headers.get(headers::SENDER_ADDRESS)
    }

    /// The bus, for code that needs to publish outside of this context.
    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Publishes `event`, carrying this unit of work's correlation headers.
    pub async fn publish<E: Message>(&self, event: &E) -> TransportResult<()> {
        let message = self.stamp(OutboundMessage::from_event(event)?);
        self.bus.publish(message).await
    }

    /// Sends `event` point-to-point to `destination`, carrying this unit of
    /// work's correlation headers.
    pub async fn send<E: Message>(&self, destination: &str, event: &E) -> TransportResult<()> {
        let message = self.stamp(OutboundMessage::from_event(event)?.to(destination));
        self.bus.publish(message).await
    }

    fn stamp(&self, mut message: OutboundMessage) -> OutboundMessage {
        for (key, value) in self.correlation.propagation_headers() {
            message.headers.insert_if_absent(key, value);
        }
        message
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("headers", &self.headers)
            .field("correlation", &self.correlation)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HandleMessage
// ============================================================================

/// Business logic for messages of type `M`.
#[async_trait]
pub trait HandleMessage<M: Message>: Send + Sync + 'static {
    async fn handle(&self, message: M, ctx: &HandlerContext) -> Result<(), BoxError>;
}

/// Adapts an async closure `Fn(M, HandlerContext) -> Future<Output = Result<(), BoxError>>`
/// into a [`HandleMessage<M>`].
pub struct HandlerFn<F, M> {
    f: F,
    _marker: PhantomData<fn() -> M>,
}

impl<F, M> HandlerFn<F, M> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F: Clone, M> Clone for HandlerFn<F, M> {
    fn clone(&self) -> Self {
        Self::new(self.f.clone())
    }
}

#[async_trait]
impl<M, F, Fut> HandleMessage<M> for HandlerFn<F, M>
where
    M: Message,
    F: Fn(M, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn handle(&self, message: M, ctx: &HandlerContext) -> Result<(), BoxError> {
        (self.f)(message, ctx.clone()).await
    }
}

// ============================================================================
// Type erasure
// ============================================================================

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Type-erased handler trait for dynamic dispatch.
pub trait ErasedHandler: Send + Sync {
    /// The `msg-type` this handler accepts.
    fn message_type(&self) -> &'static str;

    /// Type name of the handler, for logs and errors.
    fn handler_name(&self) -> &'static str;

    /// Decodes the message body and invokes the handler.
    fn call<'a>(
        &'a self,
        message: &'a InboundMessage,
        ctx: &'a HandlerContext,
    ) -> BoxFuture<'a, Result<(), ProcessingError>>;
}

struct TypedHandler<M, H> {
    handler: H,
    _marker: PhantomData<fn() -> M>,
}

impl<M, H> ErasedHandler for TypedHandler<M, H>
where
    M: Message,
    H: HandleMessage<M>,
{
    fn message_type(&self) -> &'static str {
        M::MESSAGE_TYPE
    }

    fn handler_name(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    fn call<'a>(
        &'a self,
        message: &'a InboundMessage,
        ctx: &'a HandlerContext,
    ) -> BoxFuture<'a, Result<(), ProcessingError>> {
        Box::pin(async move {
            let decoded = message.decode::<M>()?;
            self.handler
                .handle(decoded, ctx)
                .await
                .map_err(|source| ProcessingError::Handler {
                    message_type: M::MESSAGE_TYPE.to_string(),
                    handler: self.handler_name(),
                    source,
                })
        })
    }
}

/// Erases a typed handler.
pub fn into_handler<M, H>(handler: H) -> BoxedHandler
where
    M: Message,
    H: HandleMessage<M>,
{
    Arc::new(TypedHandler {
        handler,
        _marker: PhantomData::<fn() -> M>,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::MessageError;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct OrderPlaced {
        order_id: u64,
    }

    impl Message for OrderPlaced {
        const MESSAGE_TYPE: &'static str = "OrderPlaced";
    }

    #[derive(Serialize, Deserialize)]
    struct OrderShipped {
        order_id: u64,
    }

    impl Message for OrderShipped {
        const MESSAGE_TYPE: &'static str = "OrderShipped";
    }

    #[derive(Default)]
    struct CapturingBus {
        published: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl EventBus for CapturingBus {
        async fn publish(&self, message: OutboundMessage) -> TransportResult<()> {
            self.published.lock().push(message);
            Ok(())
        }
    }

    fn context(bus: Arc<CapturingBus>) -> HandlerContext {
        let mut correlation = CorrelationStore::new();
        correlation.set_headers([
            (headers::REQUEST_ID, ["req-1"]),
            (headers::CORRELATION_CONTEXT, ["ctx-1"]),
        ]);
        HandlerContext::new(Headers::new(), correlation, bus)
    }

    #[tokio::test]
    async fn test_publish_propagates_correlation() {
        let bus = Arc::new(CapturingBus::default());
        let ctx = context(bus.clone());

        ctx.publish(&OrderShipped { order_id: 1 }).await.unwrap();

        let published = bus.published.lock();
        let stamped = &published[0].headers;
        assert_eq!(stamped.get(headers::REQUEST_ID), Some("req-1"));
        assert_eq!(stamped.get(headers::CORRELATION_CONTEXT), Some("ctx-1"));
        assert_eq!(stamped.get(headers::CORRELATION_ID), Some("ctx-1"));
        assert_eq!(published[0].destination, None);
    }

    #[tokio::test]
    async fn test_send_sets_destination() {
        let bus = Arc::new(CapturingBus::default());
        let ctx = context(bus.clone());

        ctx.send("billing", &OrderShipped { order_id: 1 }).await.unwrap();
        assert_eq!(bus.published.lock()[0].destination.as_deref(), Some("billing"));
    }

    #[tokio::test]
    async fn test_erased_closure_handler_decodes_body() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in_handler = seen.clone();
        let handler = into_handler(HandlerFn::new(move |order: OrderPlaced, _ctx: HandlerContext| {
            let seen = seen_in_handler.clone();
            async move {
                *seen.lock() = Some(order.order_id);
                Ok(())
            }
        }));

        assert_eq!(handler.message_type(), "OrderPlaced");
        let message = InboundMessage::from_event(&OrderPlaced { order_id: 42 }).unwrap();
        let ctx = context(Arc::new(CapturingBus::default()));
        handler.call(&message, &ctx).await.unwrap();
        assert_eq!(*seen.lock(), Some(42));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_reported() {
        let handler = into_handler(HandlerFn::new(|_: OrderPlaced, _: HandlerContext| async {
            Ok(())
        }));
        let message = InboundMessage::new(Headers::new(), json!("not an order"));
        let ctx = context(Arc::new(CapturingBus::default()));

        let err = handler.call(&message, &ctx).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Message(MessageError::Decode { .. })));
    }
}
