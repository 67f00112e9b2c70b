use async_trait::async_trait;

use crate::pipeline::{IncomingStep, Next, StepContext, StepResult};

/// Copies every inbound header into the unit of work's
/// [`CorrelationStore`](conveyor_core::CorrelationStore), then continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderCaptureStep;

impl HeaderCaptureStep {
    pub const NAME: &'static str = "header-capture";
}

#[async_trait]
impl IncomingStep for HeaderCaptureStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn process(&self, ctx: &mut StepContext, next: Next<'_>) -> StepResult {
        let entries: Vec<(String, [String; 1])> = ctx
            .message()
            .headers
            .iter()
            .map(|(key, value)| (key.to_owned(), [value.to_owned()]))
            .collect();
        ctx.correlation_mut().set_headers(entries);
        next.run(ctx).await
    }
}
