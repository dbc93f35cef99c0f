//! Error type for contract violations
//!
//! Unmeasurable gains and lags are not errors; they travel as
//! [`Measure::Unknown`](crate::measure::Measure) entries. This type covers
//! inputs that break the calling contract.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("integrator failure: {0}")]
    Integrator(String),
    #[error("calibration failed: {0}")]
    Calibration(String),
}

pub(crate) fn ensure_len(
    context: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), ResponseError> {
    if expected == actual {
        return Ok(());
    }

    Err(ResponseError::LengthMismatch {
        context,
        expected,
        got: actual,
    })
}
