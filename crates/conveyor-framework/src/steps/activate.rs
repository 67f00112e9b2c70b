use std::sync::Arc;

use async_trait::async_trait;
use conveyor_core::{EventBus, MessageError, headers};
use tracing::debug;

use crate::error::ProcessingError;
use crate::handler::HandlerContext;
use crate::pipeline::{IncomingStep, Next, StepContext, StepResult};
use crate::registry::HandlerRegistry;

/// Resolves the handlers registered for the message type and invokes each
/// of them in registration order, then continues with any steps inserted
/// after it.
///
/// A handler failure stops the remaining handlers and fails the message.
pub struct ActivateHandlersStep {
    registry: Arc<HandlerRegistry>,
    bus: Arc<dyn EventBus>,
}

impl ActivateHandlersStep {
    pub const NAME: &'static str = "activate-handlers";

    pub fn new(registry: Arc<HandlerRegistry>, bus: Arc<dyn EventBus>) -> Self {
        Self { registry, bus }
    }
}

#[async_trait]
impl IncomingStep for ActivateHandlersStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn process(&self, ctx: &mut StepContext, next: Next<'_>) -> StepResult {
        {
            let message = ctx.message();
            let message_type = message
                .message_type()
                .ok_or(MessageError::MissingHeader(headers::MESSAGE_TYPE))?;

            let handlers = self.registry.handlers_for(message_type);
            if handlers.is_empty() {
                return Err(ProcessingError::NoHandlers(message_type.to_string()));
            }

            let handler_ctx = HandlerContext::new(
                message.headers.clone(),
                ctx.correlation().clone(),
                self.bus.clone(),
            );
            for handler in handlers {
                debug!(
                    message_type,
                    handler = handler.handler_name(),
                    "Invoking handler"
                );
                handler.call(message, &handler_ctx).await?;
            }
        }

        next.run(ctx).await
    }
}

impl std::fmt::Debug for ActivateHandlersStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivateHandlersStep")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
