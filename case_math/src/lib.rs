//! # Case Math
//!
//! Streaming indicators over daily case counts.
//!
//! Every indicator follows the same shape: build it with a window, feed values in
//! chronological order with `update`, and read the current value with `value`. Until a
//! full window has been seen, `value` returns [`MathError::InsufficientData`] so the
//! caller decides what neutral default to substitute.

use num_traits::Float;
use thiserror::Error;

pub mod moving_averages;
pub mod oscillators;
pub mod regression;
pub mod volatility;

pub use moving_averages::{ExponentialMovingAverage, SimpleMovingAverage};
pub use oscillators::{Macd, RelativeStrengthIndex};
pub use regression::{RollingAutocorrelation, RollingSlope};
pub use volatility::{BollingerBands, StandardDeviation};

/// Errors that can occur in indicator calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for indicator operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Rejects non-finite inputs before they poison a rolling window.
pub(crate) fn ensure_finite(value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(MathError::InvalidInput(format!(
            "Value must be finite, got {}",
            value
        )))
    }
}

/// Returns `value` when it is finite, `default` otherwise.
pub fn finite_or<T: Float>(value: T, default: T) -> T {
    if value.is_finite() {
        value
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_or_replaces_nan_and_infinity() {
        assert_eq!(finite_or(f64::NAN, 50.0), 50.0);
        assert_eq!(finite_or(f64::INFINITY, 0.0), 0.0);
        assert_eq!(finite_or(3.5_f64, 0.0), 3.5);
    }

    #[test]
    fn non_finite_input_is_rejected() {
        assert!(ensure_finite(f64::NAN).is_err());
        assert!(ensure_finite(1.0).is_ok());
    }
}
