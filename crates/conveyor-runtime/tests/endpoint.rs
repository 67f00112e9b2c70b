//! End-to-end tests of a runtime over the in-memory broker.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use conveyor_core::{
    BoxError, EventBus, InboundMessage, OutboundMessage, Transport, TransportResult, headers,
};
use conveyor_framework::{
    HandlerRegistry, IncomingStep, LoggingStep, Next, PipelineError, RelativePosition,
    StepContext, StepResult,
};
use conveyor_macros::Message;
use conveyor_runtime::{
    ConveyorConfig, InMemoryTransport, MemoryBroker, Runtime, RuntimeError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, oneshot};
use tokio::time::timeout;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize, Message)]
#[message(name = "orders.OrderPlaced")]
struct OrderPlaced {
    order_id: u64,
}

#[derive(Debug, Serialize, Deserialize, Message)]
#[message(name = "orders.OrderConfirmed")]
struct OrderConfirmed {
    order_id: u64,
}

fn config(workers: usize, max_parallelism: usize) -> ConveyorConfig {
    let mut config = ConveyorConfig::default();
    config.bus.input_queue = "orders".into();
    config.bus.workers = workers;
    config.bus.max_parallelism = max_parallelism;
    config
}

fn order(order_id: u64) -> OutboundMessage {
    OutboundMessage::from_event(&OrderPlaced { order_id })
        .unwrap()
        .to("orders")
        .with_header(headers::REQUEST_ID, format!("req-{order_id}"))
}

#[tokio::test]
async fn test_order_placed_is_handled_and_correlation_propagates() {
    let broker = MemoryBroker::new();
    let orders = Arc::new(broker.endpoint("orders"));
    let audit = broker.endpoint("audit");
    broker.subscribe_to::<OrderConfirmed>("audit");

    let mut registry = HandlerRegistry::new();
    registry.register_fn::<OrderPlaced, _, _>(|order, ctx| async move {
        ctx.publish(&OrderConfirmed {
            order_id: order.order_id,
        })
        .await?;
        Ok::<(), BoxError>(())
    });

    let runtime = Runtime::builder()
        .config(config(1, 4))
        .transport(orders)
        .handlers(registry)
        .without_logging()
        .build()
        .unwrap();

    runtime
        .bus()
        .publish(order(42).with_header(headers::EMAIL, "ada@example.com"))
        .await
        .unwrap();

    let (tx, rx) = oneshot::channel();
    let confirmed = async move {
        if let Ok(Some(message)) = audit.receive().await {
            let _ = tx.send(message);
        }
    };
    timeout(TIMEOUT, runtime.run_until(confirmed))
        .await
        .unwrap()
        .unwrap();

    let confirmed = rx.await.unwrap();
    assert_eq!(confirmed.message_type(), Some("orders.OrderConfirmed"));
    assert_eq!(confirmed.sender(), Some("orders"));
    assert_eq!(confirmed.headers.get(headers::REQUEST_ID), Some("req-42"));
    assert_eq!(confirmed.headers.get(headers::EMAIL), Some("ada@example.com"));
    assert_eq!(confirmed.decode::<OrderConfirmed>().unwrap().order_id, 42);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_messages_keep_their_own_correlation() {
    let transport = Arc::new(InMemoryTransport::standalone("orders"));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut registry = HandlerRegistry::new();
    let recorder = seen.clone();
    registry.register_fn::<OrderPlaced, _, _>(move |order, ctx| {
        let recorder = recorder.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(order.order_id % 5)).await;
            let request_id = ctx.correlation().request_id().unwrap_or_default().to_string();
            recorder.lock().push((order.order_id, request_id));
            Ok::<(), BoxError>(())
        }
    });

    let runtime = Runtime::builder()
        .config(config(4, 8))
        .transport(transport.clone())
        .handlers(registry)
        .without_logging()
        .build()
        .unwrap();

    for order_id in 0..20 {
        runtime.bus().publish(order(order_id)).await.unwrap();
    }
    transport.close();

    timeout(TIMEOUT, runtime.run_until(std::future::pending()))
        .await
        .unwrap()
        .unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 20);
    for (order_id, request_id) in seen.iter() {
        assert_eq!(request_id, &format!("req-{order_id}"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_messages_are_bounded_by_max_parallelism() {
    let transport = Arc::new(InMemoryTransport::standalone("orders"));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::new();
    let (counter, max, done) = (in_flight.clone(), peak.clone(), handled.clone());
    registry.register_fn::<OrderPlaced, _, _>(move |_order, _ctx| {
        let (counter, max, done) = (counter.clone(), max.clone(), done.clone());
        async move {
            let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            counter.fetch_sub(1, Ordering::SeqCst);
            done.fetch_add(1, Ordering::SeqCst);
            Ok::<(), BoxError>(())
        }
    });

    let runtime = Runtime::builder()
        .config(config(4, 2))
        .transport(transport.clone())
        .handlers(registry)
        .without_logging()
        .build()
        .unwrap();

    for order_id in 0..10 {
        runtime.bus().publish(order(order_id)).await.unwrap();
    }
    transport.close();

    timeout(TIMEOUT, runtime.run_until(std::future::pending()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 10);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_failed_message_does_not_stop_the_endpoint() {
    let transport = Arc::new(InMemoryTransport::standalone("orders"));
    let handled = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::new();
    let done = handled.clone();
    registry.register_fn::<OrderPlaced, _, _>(move |order, _ctx| {
        let done = done.clone();
        async move {
            if order.order_id == 2 {
                return Err::<(), BoxError>("payment declined".into());
            }
            done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let runtime = Runtime::builder()
        .config(config(1, 1))
        .transport(transport.clone())
        .handlers(registry)
        .without_logging()
        .build()
        .unwrap();

    for order_id in 0..5 {
        runtime.bus().publish(order(order_id)).await.unwrap();
    }
    transport.close();

    timeout(TIMEOUT, runtime.run_until(std::future::pending()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handled.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_memory_address_subscribes_to_handled_types() {
    let notify = Arc::new(Notify::new());

    let mut registry = HandlerRegistry::new();
    let handled = notify.clone();
    registry.register_fn::<OrderPlaced, _, _>(move |_order, _ctx| {
        let handled = handled.clone();
        async move {
            handled.notify_one();
            Ok::<(), BoxError>(())
        }
    });

    let runtime = Runtime::builder()
        .config(config(1, 1))
        .handlers(registry)
        .without_logging()
        .build()
        .unwrap();

    // Published without a destination; routed by subscription.
    runtime
        .bus()
        .publish(OutboundMessage::from_event(&OrderPlaced { order_id: 1 }).unwrap())
        .await
        .unwrap();

    let waiter = notify.clone();
    timeout(TIMEOUT, runtime.run_until(async move { waiter.notified().await }))
        .await
        .unwrap()
        .unwrap();
}

struct Timing;

#[async_trait]
impl IncomingStep for Timing {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn process(&self, ctx: &mut StepContext, next: Next<'_>) -> StepResult {
        next.run(ctx).await
    }
}

#[test]
fn test_extra_steps_are_placed_relative_to_anchors() {
    let runtime = Runtime::builder()
        .config(config(1, 1))
        .transport(Arc::new(InMemoryTransport::standalone("orders")))
        .handlers(HandlerRegistry::new())
        .step(Timing, RelativePosition::After(LoggingStep::NAME))
        .without_logging()
        .build()
        .unwrap();

    assert_eq!(
        runtime.pipeline().describe(),
        "header-capture -> logging -> timing -> activate-handlers"
    );
}

#[test]
fn test_unknown_anchor_fails_at_build() {
    let err = Runtime::builder()
        .config(config(1, 1))
        .transport(Arc::new(InMemoryTransport::standalone("orders")))
        .handlers(HandlerRegistry::new())
        .step(Timing, RelativePosition::Before("authorize"))
        .without_logging()
        .build()
        .unwrap_err();

    assert!(matches!(
        err,
        RuntimeError::Pipeline(PipelineError::UnknownAnchor {
            step: "timing",
            anchor: "authorize"
        })
    ));
}

#[test]
fn test_unsupported_address_without_transport() {
    let mut config = config(1, 1);
    config.bus.address = "amqp://localhost".into();

    let err = Runtime::builder()
        .config(config)
        .handlers(HandlerRegistry::new())
        .without_logging()
        .build()
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnsupportedAddress(a) if a == "amqp://localhost"));
}

#[test]
fn test_invalid_config_fails_at_build() {
    let err = Runtime::builder()
        .config(config(0, 1))
        .handlers(HandlerRegistry::new())
        .without_logging()
        .build()
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Config(_)));
}

#[tokio::test]
async fn test_runtime_runs_once() {
    let runtime = Runtime::builder()
        .config(config(1, 1))
        .transport(Arc::new(InMemoryTransport::standalone("orders")))
        .handlers(HandlerRegistry::new())
        .without_logging()
        .build()
        .unwrap();

    runtime.run_until(async {}).await.unwrap();
    assert!(matches!(
        runtime.run_until(async {}).await,
        Err(RuntimeError::AlreadyStarted)
    ));
}

/// Delegates to an in-memory queue and records every failure reported back.
struct RecordingTransport {
    inner: InMemoryTransport,
    failures: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    fn address(&self) -> &str {
        self.inner.address()
    }

    async fn send(&self, message: OutboundMessage) -> TransportResult<()> {
        self.inner.send(message).await
    }

    async fn receive(&self) -> TransportResult<Option<InboundMessage>> {
        self.inner.receive().await
    }

    async fn fail(&self, message: &InboundMessage, error: &BoxError) -> TransportResult<()> {
        let request_id = message.headers.get(headers::REQUEST_ID).unwrap_or_default();
        self.failures
            .lock()
            .push((request_id.to_string(), error.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_messages_are_reported_to_the_transport() {
    let transport = Arc::new(RecordingTransport {
        inner: InMemoryTransport::standalone("orders"),
        failures: Mutex::new(Vec::new()),
    });

    let mut registry = HandlerRegistry::new();
    registry.register_fn::<OrderPlaced, _, _>(|order, _ctx| async move {
        if order.order_id == 2 {
            return Err::<(), BoxError>("payment declined".into());
        }
        Ok(())
    });

    let runtime = Runtime::builder()
        .config(config(1, 1))
        .transport(transport.clone())
        .handlers(registry)
        .without_logging()
        .build()
        .unwrap();

    for order_id in 1..=3 {
        runtime.bus().publish(order(order_id)).await.unwrap();
    }
    transport.inner.close();

    timeout(TIMEOUT, runtime.run_until(std::future::pending()))
        .await
        .unwrap()
        .unwrap();

    let failures = transport.failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "req-2");
    assert!(failures[0].1.contains("payment declined"));
}

/// Records the `scope` field of the `inbound_message` span enclosing each
/// event.
#[derive(Clone, Default)]
struct ScopeCapture(Arc<Mutex<Vec<(String, String)>>>);

struct Scope(String);

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    scope: Option<String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{value:?}")),
            "scope" => self.scope = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

impl<S> Layer<S> for ScopeCapture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(scope), Some(span)) = (visitor.scope, ctx.span(id)) {
            span.extensions_mut().insert(Scope(scope));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let Some(message) = visitor.message else {
            return;
        };

        let scope = ctx.event_scope(event).and_then(|spans| {
            spans
                .filter(|span| span.name() == "inbound_message")
                .find_map(|span| span.extensions().get::<Scope>().map(|s| s.0.clone()))
        });
        if let Some(scope) = scope {
            self.0.lock().push((message, scope));
        }
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_logging_scope_reaches_handler_records() {
    let captured = ScopeCapture::default();
    let subscriber = tracing_subscriber::registry().with(captured.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let transport = Arc::new(InMemoryTransport::standalone("orders"));
    let mut registry = HandlerRegistry::new();
    registry.register_fn::<OrderPlaced, _, _>(|order, _ctx| async move {
        tracing::info!(order_id = order.order_id, "Reserving stock");
        Ok::<(), BoxError>(())
    });

    let runtime = Runtime::builder()
        .config(config(1, 1))
        .transport(transport.clone())
        .handlers(registry)
        .logging_scope("service", "orders")
        .without_logging()
        .build()
        .unwrap();

    runtime.bus().publish(order(7)).await.unwrap();
    transport.close();

    timeout(TIMEOUT, runtime.run_until(std::future::pending()))
        .await
        .unwrap()
        .unwrap();

    let records = captured.0.lock();
    let handled = records
        .iter()
        .find(|(message, _)| message == "Reserving stock")
        .unwrap();
    assert_eq!(handled.1, "service=orders");
}
