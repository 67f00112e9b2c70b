use std::future::Future;

use conveyor_core::Outcome;
use tracing::{Instrument, warn};

use super::{CallShape, IntoOutcome, Invocation, capture, capture_async};

/// Converts failures raised by the wrapped call into [`Outcome::Fail`].
///
/// The call must declare a return type implementing [`IntoOutcome`]:
/// `Outcome<T>`, or `Result<Outcome<T>, E>` for targets that raise `E`.
/// Whatever the call returns as an `Outcome` is handed back unchanged; an
/// `Err` or a panic becomes `Outcome::Fail` carrying the error, and is
/// logged at WARN with the call's arguments.
///
/// A target that does not commit to the `Outcome` contract does not compile:
///
/// ```compile_fail
/// use conveyor_framework::{FaultConvertingInterceptor, Invocation};
///
/// let interceptor = FaultConvertingInterceptor::new();
/// let _ = interceptor.intercept_sync(Invocation::new("Inventory", "count"), || {
///     Ok::<u32, std::io::Error>(3)
/// });
/// ```
///
/// ```
/// use conveyor_core::Outcome;
/// use conveyor_framework::{FaultConvertingInterceptor, Invocation};
///
/// let interceptor = FaultConvertingInterceptor::new();
/// let outcome = interceptor.intercept_sync(Invocation::new("Inventory", "count"), || {
///     Err::<Outcome<u32>, _>(std::io::Error::other("inventory offline"))
/// });
/// assert!(outcome.is_fail());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultConvertingInterceptor {
    _private: (),
}

impl FaultConvertingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intercepts a synchronous call.
    pub fn intercept_sync<R, F>(&self, invocation: Invocation, call: F) -> Outcome<R::Value>
    where
        F: FnOnce() -> R,
        R: IntoOutcome,
    {
        let span = invocation.span(CallShape::Sync);
        let _enter = span.enter();
        invocation.log_arguments();

        let outcome = capture(call);
        report(&invocation, &outcome);
        outcome
    }

    /// Intercepts an asynchronous call. The future is awaited inside the
    /// call span; the conversion applies to its settled value.
    pub async fn intercept<R, Fut>(&self, invocation: Invocation, call: Fut) -> Outcome<R::Value>
    where
        Fut: Future<Output = R>,
        R: IntoOutcome,
    {
        let span = invocation.span(CallShape::Async);
        span.in_scope(|| invocation.log_arguments());

        async move {
            let outcome = capture_async(call).await;
            report(&invocation, &outcome);
            outcome
        }
        .instrument(span)
        .await
    }
}

fn report<T>(invocation: &Invocation, outcome: &Outcome<T>) {
    if let Outcome::Fail(error) = outcome {
        warn!(
            target_type = invocation.target(),
            method = invocation.method(),
            error = %error,
            arguments = %invocation.rendered_arguments(),
            "Error happened while executing {}: {error}",
            invocation.qualified_name()
        );
    }
}
