//! Order Service Example
//!
//! An endpoint that reserves stock for placed orders and announces the
//! result, wired with the default pipeline plus one timing step:
//!
//! ```text
//! header-capture -> logging -> timing -> activate-handlers
//! ```
//!
//! On start it places a few orders on its own input queue. With the seeded
//! inventory they exercise every path: a successful reservation, a shortage
//! (returned as `Outcome::Fail`) and an unknown sku (an error converted into
//! `Outcome::Fail` and logged with the call's arguments).
//!
//! # Usage
//!
//! ```bash
//! cargo run --package order-service -- --config demos/order_service/conveyor.toml --run-for 2
//! ```

mod inventory;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use conveyor::framework::{ProjectedResponse, STATUS_OK};
use conveyor::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use inventory::Inventory;

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Message)]
#[message(name = "orders.OrderPlaced", crate = "conveyor::core")]
struct OrderPlaced {
    order_id: u64,
    sku: String,
    quantity: u32,
}

#[derive(Debug, Serialize, Deserialize, Message)]
#[message(name = "orders.OrderConfirmed", crate = "conveyor::core")]
struct OrderConfirmed {
    order_id: u64,
    remaining_stock: u32,
    total_cents: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Message)]
#[message(name = "orders.OrderRejected", crate = "conveyor::core")]
struct OrderRejected {
    order_id: u64,
    reason: String,
}

// ============================================================================
// Handlers
// ============================================================================

struct ReserveStock {
    inventory: Arc<Inventory>,
    projector: Projector<u32>,
}

impl ReserveStock {
    fn new() -> Self {
        Self {
            inventory: Arc::new(Inventory::seeded()),
            projector: Projector::default(),
        }
    }
}

#[register_handler(constructor = "ReserveStock::new", crate = "conveyor::framework")]
#[async_trait]
impl HandleMessage<OrderPlaced> for ReserveStock {
    async fn handle(&self, order: OrderPlaced, ctx: &HandlerContext) -> Result<(), BoxError> {
        let unit_price = PassThroughInterceptor::new().intercept_sync_logged(
            Invocation::of::<Inventory>("price").arg(&order.sku),
            || self.inventory.price(&order.sku),
        );

        let outcome = FaultConvertingInterceptor::new()
            .intercept(
                Invocation::of::<Inventory>("reserve")
                    .arg(&order.sku)
                    .arg(&order.quantity),
                self.inventory.reserve(&order.sku, order.quantity),
            )
            .await;

        let ProjectedResponse { status, body } = self.projector.project(outcome)?;
        info!(order_id = order.order_id, status, %body, "Reservation projected");

        if status == STATUS_OK {
            ctx.publish(&OrderConfirmed {
                order_id: order.order_id,
                remaining_stock: body.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or_default(),
                total_cents: unit_price.ok().map(|price| price * u64::from(order.quantity)),
            })
            .await?;
        } else {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("reservation failed");
            ctx.publish(&OrderRejected {
                order_id: order.order_id,
                reason: reason.to_string(),
            })
            .await?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct AuditTrail;

#[register_handler(crate = "conveyor::framework")]
#[async_trait]
impl HandleMessage<OrderConfirmed> for AuditTrail {
    async fn handle(&self, event: OrderConfirmed, _ctx: &HandlerContext) -> Result<(), BoxError> {
        info!(
            order_id = event.order_id,
            remaining_stock = event.remaining_stock,
            total_cents = ?event.total_cents,
            "Order confirmed"
        );
        Ok(())
    }
}

#[register_handler(crate = "conveyor::framework")]
#[async_trait]
impl HandleMessage<OrderRejected> for AuditTrail {
    async fn handle(&self, event: OrderRejected, ctx: &HandlerContext) -> Result<(), BoxError> {
        warn!(
            order_id = event.order_id,
            reason = %event.reason,
            email = ctx.correlation().email(),
            "Order rejected"
        );
        Ok(())
    }
}

// ============================================================================
// Extra pipeline step
// ============================================================================

/// Logs how long the rest of the pipeline took for each message.
struct Timing;

#[async_trait]
impl IncomingStep for Timing {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn process(&self, ctx: &mut StepContext, next: Next<'_>) -> StepResult {
        let started = Instant::now();
        let result = next.run(ctx).await;
        debug!(
            elapsed_us = started.elapsed().as_micros() as u64,
            ok = result.is_ok(),
            "Message handled"
        );
        result
    }
}

// ============================================================================
// Startup
// ============================================================================

#[derive(Parser)]
#[command(name = "order-service", about = "Conveyor order service example")]
struct Args {
    /// Configuration file (defaults to conveyor.toml in the working directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of orders placed on start.
    #[arg(long, default_value_t = 3)]
    orders: u64,

    /// Stop after this many seconds instead of waiting for Ctrl+C.
    #[arg(long)]
    run_for: Option<u64>,
}

/// Places `count` orders on the endpoint's own queue.
async fn place_orders(runtime: &Runtime, count: u64) -> Result<()> {
    let bus = runtime.bus();
    let queue = runtime.config().bus.input_queue.clone();

    for order_id in 1..=count {
        let sku = if order_id % 3 == 0 { "SKU-404" } else { "SKU-1" };
        let order = OrderPlaced {
            order_id,
            sku: sku.to_string(),
            quantity: u32::try_from(order_id * 2).unwrap_or(u32::MAX),
        };

        let message = OutboundMessage::from_event(&order)?
            .to(queue.as_str())
            .with_header(headers::REQUEST_ID, format!("req-{order_id}"))
            .with_header(headers::CORRELATION_CONTEXT, "demo-checkout")
            .with_header(headers::EMAIL, "buyer@example.com");
        bus.publish(message).await?;
        info!(order_id, sku, "Placed order");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder =
        Runtime::builder().step(Timing, RelativePosition::After(LoggingStep::NAME));
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    let runtime = builder.build()?;

    place_orders(&runtime, args.orders).await?;

    match args.run_for {
        Some(secs) => {
            runtime
                .run_until(tokio::time::sleep(Duration::from_secs(secs)))
                .await?
        }
        None => runtime.run().await?,
    }
    Ok(())
}
