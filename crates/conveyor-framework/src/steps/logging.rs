use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{Instrument, debug, info, info_span};

use crate::pipeline::{IncomingStep, Next, StepContext, StepResult};

/// Logs every inbound message and scopes the rest of the pipeline in an
/// `inbound_message` span carrying the correlation identifiers.
///
/// Emits one INFO record with the message type, sender and headers, and one
/// DEBUG record with the body. Everything logged further down the pipeline,
/// handlers included, inherits the span's `request_id`,
/// `correlation_context` and `email` fields along with the static scope
/// fields configured at construction.
#[derive(Debug, Clone)]
pub struct LoggingStep {
    scope: BTreeMap<String, String>,
    rendered_scope: String,
}

impl LoggingStep {
    pub const NAME: &'static str = "logging";

    /// A logging step with no static scope fields.
    pub fn new() -> Self {
        Self {
            scope: BTreeMap::new(),
            rendered_scope: String::new(),
        }
    }

    /// Adds a static key/value pair to every message's logging scope.
    pub fn with_scope_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.scope.insert(key.into(), value.into());
        self.rendered_scope = self
            .scope
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        self
    }

    pub fn scope(&self) -> &BTreeMap<String, String> {
        &self.scope
    }
}

impl Default for LoggingStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IncomingStep for LoggingStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn process(&self, ctx: &mut StepContext, next: Next<'_>) -> StepResult {
        let span = {
            let message = ctx.message();
            let correlation = ctx.correlation();
            let event_type = message.message_type().unwrap_or("<unknown>");
            let sender = message.sender().unwrap_or("<unknown>");

            let span = info_span!(
                "inbound_message",
                scope = %self.rendered_scope,
                request_id = correlation.request_id().unwrap_or_default(),
                correlation_context = correlation.correlation_context().unwrap_or_default(),
                email = correlation.email(),
            );
            span.in_scope(|| {
                let headers = serde_json::to_string(&message.headers).unwrap_or_default();
                info!(
                    event_type,
                    event_sender = sender,
                    headers = %headers,
                    "Event type {event_type} from {sender}"
                );
                debug!(body = %message.body, "Event body");
            });
            span
        };

        next.run(ctx).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineBuilder, RelativePosition};
    use crate::steps::HeaderCaptureStep;
    use crate::error::ProcessingError;
    use crate::test_support;
    use conveyor_core::{Headers, InboundMessage, headers};
    use serde_json::json;
    use tracing::Level;

    struct Handler;

    #[async_trait]
    impl IncomingStep for Handler {
        fn name(&self) -> &'static str {
            "handler"
        }

        async fn process(&self, _ctx: &mut StepContext, _next: Next<'_>) -> StepResult {
            info!("handled");
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl IncomingStep for FailingHandler {
        fn name(&self) -> &'static str {
            "handler"
        }

        async fn process(&self, _ctx: &mut StepContext, _next: Next<'_>) -> StepResult {
            Err(ProcessingError::step("handler", "payment declined"))
        }
    }

    fn order_placed() -> InboundMessage {
        InboundMessage::new(
            Headers::new()
                .with(headers::MESSAGE_TYPE, "OrderPlaced")
                .with(headers::SENDER_ADDRESS, "svc-a")
                .with(headers::REQUEST_ID, "r1")
                .with(headers::CORRELATION_CONTEXT, "c1"),
            json!({ "order_id": 7 }),
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_logs_event_and_scopes_handlers() {
        let (captured, _guard) = test_support::capture();
        let pipeline = PipelineBuilder::new(Handler)
            .insert(HeaderCaptureStep, RelativePosition::Before("handler"))
            .unwrap()
            .insert(
                LoggingStep::new().with_scope_field("service", "orders"),
                RelativePosition::Before("handler"),
            )
            .unwrap()
            .build();

        pipeline.run(order_placed()).await.unwrap();

        let info = captured.find("Event type").unwrap();
        assert_eq!(info.level, Level::INFO);
        assert_eq!(info.message, "Event type OrderPlaced from svc-a");
        assert_eq!(info.field("event_type"), Some("OrderPlaced"));
        assert!(info.field("headers").unwrap().contains("\"request-id\":\"r1\""));

        let body = captured.find("Event body").unwrap();
        assert_eq!(body.level, Level::DEBUG);
        assert_eq!(body.field("body"), Some("{\"order_id\":7}"));

        let handled = captured.find("handled").unwrap();
        assert!(handled.spans.iter().any(|s| s == "inbound_message"));
        assert_eq!(handled.field("request_id"), Some("r1"));
        assert_eq!(handled.field("correlation_context"), Some("c1"));
        assert_eq!(handled.field("email"), Some("unknown"));
        assert_eq!(handled.field("scope"), Some("service=orders"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_missing_headers_do_not_fail() {
        let (captured, _guard) = test_support::capture();
        let pipeline = PipelineBuilder::new(Handler)
            .insert(LoggingStep::new(), RelativePosition::Before("handler"))
            .unwrap()
            .build();

        pipeline
            .run(InboundMessage::new(Headers::new(), json!(null)))
            .await
            .unwrap();

        let info = captured.find("Event type").unwrap();
        assert_eq!(info.message, "Event type <unknown> from <unknown>");
        assert_eq!(captured.find("handled").unwrap().field("request_id"), Some(""));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_event_logged_even_when_handler_fails() {
        let (captured, _guard) = test_support::capture();
        let pipeline = PipelineBuilder::new(FailingHandler)
            .insert(HeaderCaptureStep, RelativePosition::Before("handler"))
            .unwrap()
            .insert(LoggingStep::new(), RelativePosition::Before("handler"))
            .unwrap()
            .build();

        let err = pipeline.run(order_placed()).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Step { step: "handler", .. }));

        let info = captured.find("Event type").unwrap();
        assert_eq!(info.level, Level::INFO);
        assert_eq!(info.message, "Event type OrderPlaced from svc-a");
        assert_eq!(info.field("request_id"), Some("r1"));
    }
}
