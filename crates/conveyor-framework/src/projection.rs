//! Projection of [`Outcome`]s onto transport-level responses.
//!
//! A [`ResultProjection`] claims the outcomes it [matches](ResultProjection::is_match)
//! and [maps](ResultProjection::map) them to a [`ProjectedResponse`]. The
//! [`Projector`] asks its projections in registration order and uses the
//! first match.

use conveyor_core::Outcome;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::ProjectionError;

/// Status used for a successful outcome.
pub const STATUS_OK: u16 = 200;
/// Status used for a failed outcome, or a success that cannot be serialized.
pub const STATUS_FAILED: u16 = 500;

/// A transport-level response: a status code and a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedResponse {
    pub status: u16,
    pub body: Value,
}

impl ProjectedResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// A failure response carrying `message` under `"error"`.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(status, json!({ "error": message.into() }))
    }
}

/// Maps some outcomes to responses.
pub trait ResultProjection<T>: Send + Sync {
    /// Returns `true` if this projection handles `outcome`.
    fn is_match(&self, outcome: &Outcome<T>) -> bool;

    /// Maps a matched outcome.
    fn map(&self, outcome: Outcome<T>) -> ProjectedResponse;
}

/// Projects any outcome: the success value serialized with status 200, or
/// the error message with status 500.
pub fn project<T: Serialize>(outcome: Outcome<T>) -> ProjectedResponse {
    match outcome {
        Outcome::Success(value) => match serde_json::to_value(&value) {
            Ok(body) => ProjectedResponse::new(STATUS_OK, body),
            Err(e) => ProjectedResponse::error(STATUS_FAILED, format!("unserializable result: {e}")),
        },
        Outcome::Fail(error) => ProjectedResponse::error(STATUS_FAILED, error.to_string()),
    }
}

/// Matches [`Outcome::Success`]; responds 200 with the serialized value.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuccessProjection;

impl<T: Serialize> ResultProjection<T> for SuccessProjection {
    fn is_match(&self, outcome: &Outcome<T>) -> bool {
        outcome.is_success()
    }

    fn map(&self, outcome: Outcome<T>) -> ProjectedResponse {
        project(outcome)
    }
}

/// Matches [`Outcome::Fail`]; responds with the error message.
#[derive(Debug, Clone, Copy)]
pub struct FailProjection {
    status: u16,
}

impl FailProjection {
    pub fn new() -> Self {
        Self {
            status: STATUS_FAILED,
        }
    }

    /// Responds with `status` instead of 500.
    pub fn with_status(status: u16) -> Self {
        Self { status }
    }
}

impl Default for FailProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultProjection<T> for FailProjection {
    fn is_match(&self, outcome: &Outcome<T>) -> bool {
        outcome.is_fail()
    }

    fn map(&self, outcome: Outcome<T>) -> ProjectedResponse {
        let message = match outcome.error() {
            Some(error) => error.to_string(),
            None => String::new(),
        };
        ProjectedResponse::error(self.status, message)
    }
}

/// An ordered set of projections.
pub struct Projector<T> {
    projections: Vec<Box<dyn ResultProjection<T>>>,
}

impl<T> Projector<T> {
    /// A projector with no projections; every outcome is unmatched.
    pub fn empty() -> Self {
        Self {
            projections: Vec::new(),
        }
    }

    pub fn with(mut self, projection: impl ResultProjection<T> + 'static) -> Self {
        self.projections.push(Box::new(projection));
        self
    }

    /// Maps `outcome` with the first matching projection.
    pub fn project(&self, outcome: Outcome<T>) -> Result<ProjectedResponse, ProjectionError> {
        match self.projections.iter().find(|p| p.is_match(&outcome)) {
            Some(projection) => Ok(projection.map(outcome)),
            None => Err(ProjectionError::Unmatched(if outcome.is_success() {
                "success"
            } else {
                "fail"
            })),
        }
    }
}

impl<T: Serialize> Default for Projector<T> {
    /// [`SuccessProjection`] then [`FailProjection`].
    fn default() -> Self {
        Self::empty().with(SuccessProjection).with(FailProjection::new())
    }
}
