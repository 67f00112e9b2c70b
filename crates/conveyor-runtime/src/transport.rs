//! In-process message broker.
//!
//! [`MemoryBroker`] keeps one unbounded queue per endpoint. A message with a
//! destination goes to that queue; a published message (no destination) goes
//! to every queue subscribed to its `msg-type`, and is dropped if there are
//! none.
//!
//! ```text
//!                    ┌──────────────── MemoryBroker ────────────────┐
//!  send(to "billing")│  "billing" ──▶ [ msg, msg ] ──▶ InMemoryTransport
//!  publish(OrderPlaced)  subscriptions: OrderPlaced → {"orders", "audit"}
//!                    └──────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at-most-once: a message handed to a worker is gone from the
//! queue whether or not it is processed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use conveyor_core::{
    InboundMessage, Message, OutboundMessage, Transport, TransportError, TransportResult, headers,
};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, trace};

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, mpsc::UnboundedSender<InboundMessage>>,
    /// Message type → subscribed queues.
    subscriptions: HashMap<String, BTreeSet<String>>,
}

/// A set of named in-memory queues shared by the endpoints created from it.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `queue` and returns the endpoint receiving from it.
    ///
    /// Declaring an existing queue replaces it; messages still in the old
    /// queue stay with the old endpoint.
    pub fn endpoint(&self, queue: impl Into<String>) -> InMemoryTransport {
        let queue = queue.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().queues.insert(queue.clone(), tx);
        debug!(queue = %queue, "Declared in-memory queue");

        InMemoryTransport {
            address: queue,
            broker: self.clone(),
            receiver: AsyncMutex::new(rx),
        }
    }

    /// Routes published messages of `message_type` to `queue`.
    pub fn subscribe(&self, queue: impl Into<String>, message_type: impl Into<String>) {
        self.state
            .lock()
            .subscriptions
            .entry(message_type.into())
            .or_default()
            .insert(queue.into());
    }

    /// [`subscribe`](Self::subscribe) by message type.
    pub fn subscribe_to<M: Message>(&self, queue: impl Into<String>) {
        self.subscribe(queue, M::MESSAGE_TYPE);
    }

    /// Removes `queue`. Its endpoint drains what is left, then receives `None`.
    pub fn close_queue(&self, queue: &str) {
        self.state.lock().queues.remove(queue);
    }

    /// Closes every queue.
    pub fn close(&self) {
        self.state.lock().queues.clear();
    }

    fn route(&self, message: OutboundMessage) -> TransportResult<()> {
        let state = self.state.lock();

        if let Some(destination) = message.destination.clone() {
            let Some(queue) = state.queues.get(&destination) else {
                return Err(TransportError::UnknownDestination(destination));
            };
            return queue
                .send(message.into())
                .map_err(|_| TransportError::UnknownDestination(destination));
        }

        let message_type = message
            .headers
            .get(headers::MESSAGE_TYPE)
            .unwrap_or_default()
            .to_string();
        let subscribers: Vec<_> = state
            .subscriptions
            .get(&message_type)
            .into_iter()
            .flatten()
            .filter_map(|queue| state.queues.get(queue).map(|tx| (queue, tx)))
            .collect();

        if subscribers.is_empty() {
            debug!(message_type = %message_type, "Published message has no subscribers");
            return Ok(());
        }

        let inbound = InboundMessage::from(message);
        for (queue, tx) in subscribers {
            trace!(message_type = %message_type, queue = %queue, "Delivering published message");
            // A receiver dropped between lookup and send is a closed queue.
            let _ = tx.send(inbound.clone());
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryBroker")
            .field("queues", &state.queues.keys().collect::<Vec<_>>())
            .field("subscriptions", &state.subscriptions)
            .finish()
    }
}

/// An endpoint on a [`MemoryBroker`], bound to one input queue.
///
/// Several workers may call `receive` concurrently; each message goes to
/// exactly one of them.
pub struct InMemoryTransport {
    address: String,
    broker: MemoryBroker,
    receiver: AsyncMutex<mpsc::UnboundedReceiver<InboundMessage>>,
}

impl InMemoryTransport {
    /// A broker with a single queue named `queue`.
    pub fn standalone(queue: impl Into<String>) -> Self {
        MemoryBroker::new().endpoint(queue)
    }

    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    /// Stops accepting messages for this queue. Queued messages are still
    /// delivered.
    pub fn close(&self) {
        self.broker.close_queue(&self.address);
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn address(&self) -> &str {
        &self.address
    }

    async fn send(&self, message: OutboundMessage) -> TransportResult<()> {
        self.broker.route(message)
    }

    async fn receive(&self) -> TransportResult<Option<InboundMessage>> {
        Ok(self.receiver.lock().await.recv().await)
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
