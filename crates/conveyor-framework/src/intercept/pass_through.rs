use std::fmt::Debug;
use std::future::Future;

use tracing::{Instrument, debug};

use super::{CallShape, Invocation};

/// Logs calls without changing their behavior.
///
/// The wrapped call's return value is handed back as is, errors and panics
/// included. [`intercept`](Self::intercept) and
/// [`intercept_sync`](Self::intercept_sync) accept any return type; the
/// `_logged` variants additionally log the returned value at DEBUG and so
/// need it to be `Debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughInterceptor {
    _private: (),
}

impl PassThroughInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intercepts a synchronous call.
    pub fn intercept_sync<T, F>(&self, invocation: Invocation, call: F) -> T
    where
        F: FnOnce() -> T,
    {
        let span = invocation.span(CallShape::Sync);
        let _enter = span.enter();
        invocation.log_arguments();
        call()
    }

    /// [`intercept_sync`](Self::intercept_sync), also logging the returned value.
    pub fn intercept_sync_logged<T, F>(&self, invocation: Invocation, call: F) -> T
    where
        T: Debug,
        F: FnOnce() -> T,
    {
        let span = invocation.span(CallShape::Sync);
        let _enter = span.enter();
        invocation.log_arguments();

        let returned = call();
        record(&returned);
        returned
    }

    /// Intercepts an asynchronous call. The call is awaited inside the
    /// call span.
    pub async fn intercept<T, Fut>(&self, invocation: Invocation, call: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let span = invocation.span(CallShape::Async);
        span.in_scope(|| invocation.log_arguments());
        call.instrument(span).await
    }

    /// [`intercept`](Self::intercept), also logging the returned value.
    pub async fn intercept_logged<T, Fut>(&self, invocation: Invocation, call: Fut) -> T
    where
        T: Debug,
        Fut: Future<Output = T>,
    {
        let span = invocation.span(CallShape::Async);
        span.in_scope(|| invocation.log_arguments());

        async move {
            let returned = call.await;
            record(&returned);
            returned
        }
        .instrument(span)
        .await
    }
}

fn record<T: Debug>(returned: &T) {
    debug!(result = ?returned, "Call returned");
}
