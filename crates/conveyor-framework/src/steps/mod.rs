//! Built-in pipeline steps.
//!
//! | Step | Name | Placement |
//! |------|------|-----------|
//! | [`HeaderCaptureStep`] | `header-capture` | before `activate-handlers` |
//! | [`LoggingStep`] | `logging` | before `activate-handlers`, after capture |
//! | [`ActivateHandlersStep`] | `activate-handlers` | terminal |

mod activate;
mod headers;
mod logging;

pub use activate::ActivateHandlersStep;
pub use headers::HeaderCaptureStep;
pub use logging::LoggingStep;
