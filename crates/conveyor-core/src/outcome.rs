//! The two-variant result channel for operations that can fail.
//!
//! [`Outcome<T>`] is what a service commits to when it wants its failures to be
//! data instead of control flow. Business code may build one directly, and the
//! fault-converting interceptor in `conveyor-framework` synthesizes
//! [`Outcome::Fail`] from errors and panics raised behind it. A projection layer
//! then maps both variants onto a transport-level response.

use std::fmt;

use crate::error::BoxError;

/// Either the success payload `T` or the error that prevented it.
#[must_use]
pub enum Outcome<T> {
    /// The operation produced its value.
    Success(T),
    /// The operation failed.
    Fail(BoxError),
}

impl<T> Outcome<T> {
    /// Wraps a value.
    pub fn success(value: T) -> Self {
        Self::Success(value)
    }

    /// Wraps an error.
    pub fn fail(error: impl Into<BoxError>) -> Self {
        Self::Fail(error.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }

    /// Returns the success value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Fail(_) => None,
        }
    }

    /// Returns the failure, if any.
    pub fn error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Success(_) => None,
            Self::Fail(error) => Some(error.as_ref()),
        }
    }

    /// Maps the success value, leaving a failure untouched.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Fail(error) => Outcome::Fail(error),
        }
    }

    /// Chains another fallible step onto a success.
    pub fn and_then<U, F: FnOnce(T) -> Outcome<U>>(self, f: F) -> Outcome<U> {
        match self {
            Self::Success(value) => f(value),
            Self::Fail(error) => Outcome::Fail(error),
        }
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T, BoxError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Fail(error) => Err(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T>
where
    E: Into<BoxError>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Fail(error.into()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(value) => f.debug_tuple("Success").field(value).finish(),
            Self::Fail(error) => f.debug_tuple("Fail").field(&error.to_string()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("out of stock")]
    struct OutOfStock;

    #[test]
    fn test_from_result() {
        let ok: Outcome<u32> = Ok::<_, OutOfStock>(3).into();
        assert_eq!(ok.value(), Some(&3));

        let failed: Outcome<u32> = Err(OutOfStock).into();
        assert!(failed.is_fail());
        assert!(failed.error().unwrap().downcast_ref::<OutOfStock>().is_some());
    }

    #[test]
    fn test_map_preserves_failure() {
        let failed: Outcome<u32> = Outcome::fail(OutOfStock);
        let mapped = failed.map(|n| n * 2);
        assert_eq!(mapped.error().unwrap().to_string(), "out of stock");
    }

    #[test]
    fn test_and_then_short_circuits() {
        let out = Outcome::success(2).and_then(|n| {
            if n > 1 {
                Outcome::<u32>::fail("too large")
            } else {
                Outcome::success(n)
            }
        });
        assert!(out.is_fail());
        assert!(out.into_result().is_err());
    }
}
