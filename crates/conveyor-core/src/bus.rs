//! Transport seam and the event bus facade.
//!
//! The broker itself is an external collaborator. The pipeline only needs the
//! narrow [`Transport`] trait to receive from its input queue and send to
//! others; business code needs even less and depends on [`EventBus`] alone, so
//! handlers never name the transport type.
//!
//! ```rust,ignore
//! use conveyor_core::{Bus, BusExt};
//!
//! let bus = Bus::new(transport);
//! bus.publish_event(&OrderShipped { order_id: 42 }).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::error::{BoxError, TransportResult};
use crate::message::{InboundMessage, Message, OutboundMessage, headers, now_millis};

/// A message broker connection bound to one input queue.
///
/// Implementations deliver at least once; redelivery and dead-lettering are
/// their concern, not the pipeline's. The runtime reports every message the
/// pipeline failed on through [`fail`](Self::fail).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The input queue this endpoint receives from. Stamped as the sender
    /// address of everything it sends.
    fn address(&self) -> &str;

    /// Sends a message. Fails with a [`TransportError`](crate::TransportError)
    /// on delivery failure.
    async fn send(&self, message: OutboundMessage) -> TransportResult<()>;

    /// Waits for the next message on the input queue.
    ///
    /// Returns `Ok(None)` once the transport is closed and drained.
    async fn receive(&self) -> TransportResult<Option<InboundMessage>>;

    /// Called when processing `message` failed with `error`, so the transport
    /// can redeliver or dead-letter it.
    ///
    /// The default does nothing: the message is considered consumed.
    async fn fail(&self, message: &InboundMessage, error: &BoxError) -> TransportResult<()> {
        let _ = (message, error);
        Ok(())
    }
}

/// The publish-only interface business logic depends on.
///
/// `publish` is a pure pass-through: no retry, no buffering, and no ordering
/// guarantee between independent publishes.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Hands a message to the transport.
    async fn publish(&self, message: OutboundMessage) -> TransportResult<()>;
}

/// Typed publishing on top of any [`EventBus`].
#[async_trait]
pub trait BusExt: EventBus {
    /// Serializes `event` and publishes it.
    async fn publish_event<E: Message>(&self, event: &E) -> TransportResult<()> {
        let message = OutboundMessage::from_event(event)?;
        self.publish(message).await
    }
}

impl<B: EventBus + ?Sized> BusExt for B {}

/// The default [`EventBus`]: stamps the standard headers and forwards to a
/// [`Transport`].
#[derive(Clone)]
pub struct Bus {
    transport: Arc<dyn Transport>,
}

impl Bus {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// The address stamped as `sender-address`.
    pub fn address(&self) -> &str {
        self.transport.address()
    }
}

#[async_trait]
impl EventBus for Bus {
    async fn publish(&self, mut message: OutboundMessage) -> TransportResult<()> {
        message
            .headers
            .insert_if_absent(headers::MESSAGE_ID, uuid::Uuid::new_v4().to_string());
        message
            .headers
            .insert(headers::SENDER_ADDRESS, self.transport.address());
        message
            .headers
            .insert(headers::SENT_TIME, now_millis().to_string());

        trace!(
            message_type = message.headers.get(headers::MESSAGE_TYPE).unwrap_or("<none>"),
            destination = message.destination.as_deref().unwrap_or("<publish>"),
            "Publishing message"
        );
        self.transport.send(message).await
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("address", &self.transport.address())
            .finish()
    }
}
