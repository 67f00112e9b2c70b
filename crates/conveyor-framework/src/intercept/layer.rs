//! Tower adapters for the interceptors.
//!
//! ```rust,ignore
//! let reserve = ServiceBuilder::new()
//!     .layer(FaultConvertLayer::new("Inventory", "reserve"))
//!     .service_fn(|request: Reserve| async move { inventory.reserve(request).await });
//! ```
//!
//! The request is recorded as the call's single argument.

use std::fmt::Debug;
use std::sync::Arc;
use std::task::{Context, Poll};

use conveyor_core::{BoxError, Outcome};
use futures::future::BoxFuture;
use serde::Serialize;
use tower::Service;
use tower_layer::Layer;

use super::{FaultConvertingInterceptor, Invocation, PassThroughInterceptor};

// ============================================================================
// Pass-through
// ============================================================================

/// Applies a [`PassThroughInterceptor`] to every call of the inner service.
///
/// The wrapped service's response and error must be `Debug` so that
/// [`log_results`](Self::log_results) can render them.
#[derive(Debug, Clone)]
pub struct InterceptLayer {
    target: Arc<str>,
    method: Arc<str>,
    interceptor: PassThroughInterceptor,
    log_results: bool,
}

impl InterceptLayer {
    pub fn new(target: impl Into<Arc<str>>, method: impl Into<Arc<str>>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            interceptor: PassThroughInterceptor::new(),
            log_results: false,
        }
    }

    /// Also logs every call's result at DEBUG.
    pub fn log_results(mut self, enabled: bool) -> Self {
        self.log_results = enabled;
        self
    }
}

impl<S> Layer<S> for InterceptLayer {
    type Service = InterceptService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InterceptService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterceptService<S> {
    inner: S,
    layer: InterceptLayer,
}

impl<S, Req> Service<Req> for InterceptService<S>
where
    S: Service<Req>,
    S::Future: Send + 'static,
    S::Response: Debug + Send + 'static,
    S::Error: Debug + Send + 'static,
    Req: Serialize,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Req) -> Self::Future {
        let invocation = Invocation::new(&*self.layer.target, &*self.layer.method).arg(&request);
        let interceptor = self.layer.interceptor;
        let log_results = self.layer.log_results;
        let fut = self.inner.call(request);
        Box::pin(async move {
            if log_results {
                interceptor.intercept_logged(invocation, fut).await
            } else {
                interceptor.intercept(invocation, fut).await
            }
        })
    }
}

// ============================================================================
// Fault conversion
// ============================================================================

/// Applies a [`FaultConvertingInterceptor`] to every call of an inner
/// service responding with [`Outcome<T>`].
///
/// Call failures become `Ok(Outcome::Fail(..))`. Readiness failures are not
/// call failures and still surface as the inner service's error.
#[derive(Debug, Clone)]
pub struct FaultConvertLayer {
    target: Arc<str>,
    method: Arc<str>,
}

impl FaultConvertLayer {
    pub fn new(target: impl Into<Arc<str>>, method: impl Into<Arc<str>>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
        }
    }
}

impl<S> Layer<S> for FaultConvertLayer {
    type Service = FaultConvertService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FaultConvertService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaultConvertService<S> {
    inner: S,
    layer: FaultConvertLayer,
}

impl<S, Req, T> Service<Req> for FaultConvertService<S>
where
    S: Service<Req, Response = Outcome<T>>,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send + 'static,
    T: Send + 'static,
    Req: Serialize,
{
    type Response = Outcome<T>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Outcome<T>, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Req) -> Self::Future {
        let invocation = Invocation::new(&*self.layer.target, &*self.layer.method).arg(&request);
        let fut = self.inner.call(request);
        Box::pin(async move {
            Ok(FaultConvertingInterceptor::new()
                .intercept(invocation, fut)
                .await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::{ServiceBuilder, ServiceExt};

    #[derive(Debug, Serialize)]
    struct Reserve {
        sku: &'static str,
    }

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("sku {0} is out of stock")]
    struct OutOfStock(&'static str);

    #[tokio::test]
    async fn test_intercept_layer_passes_errors_through() {
        let svc = ServiceBuilder::new()
            .layer(InterceptLayer::new("Inventory", "reserve").log_results(true))
            .service_fn(|request: Reserve| async move {
                if request.sku == "A-1" {
                    Ok(1u32)
                } else {
                    Err(OutOfStock(request.sku))
                }
            });

        assert_eq!(svc.clone().oneshot(Reserve { sku: "A-1" }).await, Ok(1));
        assert_eq!(
            svc.oneshot(Reserve { sku: "Z-9" }).await,
            Err(OutOfStock("Z-9"))
        );
    }

    #[tokio::test]
    async fn test_fault_convert_layer_folds_errors_into_outcome() {
        let svc = ServiceBuilder::new()
            .layer(FaultConvertLayer::new("Inventory", "reserve"))
            .service_fn(|request: Reserve| async move {
                match request.sku {
                    "A-1" => Ok(Outcome::success(1u32)),
                    "P-0" => panic!("inventory offline"),
                    sku => Err(OutOfStock(sku)),
                }
            });

        let reserved = svc.clone().oneshot(Reserve { sku: "A-1" }).await.unwrap();
        assert_eq!(reserved.value(), Some(&1));

        let failed = svc.clone().oneshot(Reserve { sku: "Z-9" }).await.unwrap();
        assert!(failed.error().unwrap().downcast_ref::<OutOfStock>().is_some());

        let panicked = svc.oneshot(Reserve { sku: "P-0" }).await.unwrap();
        assert!(panicked.is_fail());
    }
}
