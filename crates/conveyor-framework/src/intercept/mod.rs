//! Call interception around service methods.
//!
//! Two interceptors wrap calls explicitly at the call site (or as tower
//! layers around a [`Service`](tower::Service)):
//!
//! - [`PassThroughInterceptor`] logs the call and returns exactly what the
//!   target returned; errors and panics pass through untouched.
//! - [`FaultConvertingInterceptor`] turns errors and panics raised by the
//!   target into [`Outcome::Fail`]. It only accepts targets whose declared
//!   return commits to the [`Outcome`] contract (see [`IntoOutcome`]);
//!   anything else is rejected when the code is compiled.
//!
//! Both run the call inside a `call` span carrying the target and method
//! names, and log the serialized arguments at DEBUG.

mod fault;
mod layer;
mod pass_through;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use conveyor_core::{BoxError, Outcome};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{Span, debug, debug_span, trace};

use crate::error::CallPanicked;

pub use fault::FaultConvertingInterceptor;
pub use layer::{FaultConvertLayer, FaultConvertService, InterceptLayer, InterceptService};
pub use pass_through::PassThroughInterceptor;

// ============================================================================
// Invocation
// ============================================================================

/// Whether the intercepted call completes synchronously or as a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    Sync,
    Async,
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => f.write_str("sync"),
            Self::Async => f.write_str("async"),
        }
    }
}

/// Description of one intercepted call: who is called and with what.
#[derive(Debug, Clone)]
pub struct Invocation {
    target: String,
    method: String,
    arguments: Vec<Value>,
}

/// Stand-in for an argument that failed to serialize.
const UNSERIALIZABLE: &str = "<unserializable>";

impl Invocation {
    pub fn new(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            arguments: Vec::new(),
        }
    }

    /// An invocation of `method` on `T`, named by its unqualified type name.
    pub fn of<T: ?Sized>(method: impl Into<String>) -> Self {
        let full = std::any::type_name::<T>();
        let path = full.split('<').next().unwrap_or(full);
        let short = path.rsplit("::").next().unwrap_or(path);
        Self::new(short, method)
    }

    /// Records an argument. Serialization failures are swallowed: the
    /// argument is logged as a placeholder and the call is unaffected.
    pub fn arg<A: Serialize + ?Sized>(mut self, argument: &A) -> Self {
        let value = match serde_json::to_value(argument) {
            Ok(value) => value,
            Err(e) => {
                trace!(
                    target_type = %self.target,
                    method = %self.method,
                    index = self.arguments.len(),
                    error = %e,
                    "Argument could not be serialized"
                );
                Value::String(UNSERIALIZABLE.to_string())
            }
        };
        self.arguments.push(value);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// `Target.method`, as used for the call span name.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.target, self.method)
    }

    /// Arguments rendered as a JSON array.
    pub fn rendered_arguments(&self) -> String {
        Value::Array(self.arguments.clone()).to_string()
    }

    pub(crate) fn span(&self, shape: CallShape) -> Span {
        debug_span!(
            "call",
            operation = %self.qualified_name(),
            target_type = %self.target,
            method = %self.method,
            shape = %shape,
        )
    }

    pub(crate) fn log_arguments(&self) {
        debug!(arguments = %self.rendered_arguments(), "Arguments");
    }
}

// ============================================================================
// IntoOutcome
// ============================================================================

/// Return types that commit to the [`Outcome`] contract.
///
/// Implemented for `Outcome<T>` itself and for `Result<Outcome<T>, E>`,
/// where `E` is the error a failing call raises. A target declaring any
/// other return type cannot be wrapped in a [`FaultConvertingInterceptor`].
pub trait IntoOutcome {
    /// The success payload type `T`.
    type Value;

    fn into_outcome(self) -> Outcome<Self::Value>;
}

impl<T> IntoOutcome for Outcome<T> {
    type Value = T;

    fn into_outcome(self) -> Outcome<T> {
        self
    }
}

impl<T, E> IntoOutcome for Result<Outcome<T>, E>
where
    E: Into<BoxError>,
{
    type Value = T;

    fn into_outcome(self) -> Outcome<T> {
        match self {
            Ok(outcome) => outcome,
            Err(error) => Outcome::Fail(error.into()),
        }
    }
}

// ============================================================================
// capture
// ============================================================================

/// Runs a synchronous call, converting an error or a panic into
/// [`Outcome::Fail`].
pub fn capture<R, F>(call: F) -> Outcome<R::Value>
where
    F: FnOnce() -> R,
    R: IntoOutcome,
{
    match std::panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(returned) => returned.into_outcome(),
        Err(payload) => Outcome::fail(CallPanicked::from_payload(payload)),
    }
}

/// Awaits a call, converting an error or a panic into [`Outcome::Fail`].
pub async fn capture_async<R, Fut>(call: Fut) -> Outcome<R::Value>
where
    Fut: Future<Output = R>,
    R: IntoOutcome,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(returned) => returned.into_outcome(),
        Err(payload) => Outcome::fail(CallPanicked::from_payload(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct InventoryService;

    #[derive(Serialize)]
    struct Sku(&'static str);

    struct Opaque;

    impl Serialize for Opaque {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("opaque"))
        }
    }

    #[test]
    fn test_invocation_of_uses_short_type_name() {
        let invocation = Invocation::of::<InventoryService>("reserve");
        assert_eq!(invocation.qualified_name(), "InventoryService.reserve");
    }

    #[test]
    fn test_unserializable_argument_is_swallowed() {
        let invocation = Invocation::new("Svc", "call")
            .arg(&Sku("A-1"))
            .arg(&Opaque)
            .arg(&3);
        assert_eq!(
            invocation.rendered_arguments(),
            r#"["A-1","<unserializable>",3]"#
        );
    }

    #[test]
    fn test_capture_flattens_result() {
        let ok = capture(|| Ok::<_, std::io::Error>(Outcome::success(1)));
        assert_eq!(ok.value(), Some(&1));

        let failed = capture(|| Err::<Outcome<u8>, _>(std::io::Error::other("disk")));
        assert_eq!(failed.error().unwrap().to_string(), "disk");
    }

    #[test]
    fn test_capture_converts_panic() {
        let failed: Outcome<u8> = capture(|| -> Outcome<u8> { panic!("boom") });
        let error = failed.error().unwrap().downcast_ref::<CallPanicked>().unwrap();
        assert_eq!(error.0, "boom");
    }

    #[test]
    fn test_capture_async_converts_panic() {
        let failed = tokio_test::block_on(capture_async(async {
            if true {
                panic!("async boom");
            }
            Outcome::success(1u8)
        }));
        assert!(failed.is_fail());
    }
}
