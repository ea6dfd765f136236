// error.rs: Error types for the policy subsystem.

use thiserror::Error;

/// Errors that can occur while building policy inputs.
///
/// Evaluation itself never errors: bad risk scores are rejections, not
/// failures.
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    /// An affective-state component is outside [0, 1] or not a number.
    #[error("affective state component '{component}' must be within [0, 1], got {value}")]
    AceOutOfRange { component: &'static str, value: f64 },
}
