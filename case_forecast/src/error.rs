//! Error types for the case_forecast crate

use case_math::MathError;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the case_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// No usable dates, empty series or otherwise unusable input. Aborts a run.
    #[error("Data error: {0}")]
    DataError(String),

    /// Fewer days than a stage needs
    #[error("Insufficient data: need at least {needed} days, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// A model candidate failed to fit
    #[error("Convergence failure: {0}")]
    Convergence(String),

    /// The configured feature scaler could not be fit
    #[error("Scaling failure: {0}")]
    ScalingFailure(String),

    /// Mismatched or non-finite inputs to an evaluation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Rejected configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from indicator calculations
    #[error("Math error: {0}")]
    Math(#[from] MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error reading encounter CSV files
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error reading or writing JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_error_converts() {
        let err = ForecastError::from(io::Error::new(io::ErrorKind::NotFound, "missing.csv"));
        assert!(matches!(err, ForecastError::IoError(_)));
        assert!(err.to_string().contains("missing.csv"));
    }

    #[test]
    fn math_error_converts() {
        let err: ForecastError = MathError::InvalidInput("period".to_string()).into();
        assert!(matches!(err, ForecastError::Math(_)));
    }

    #[test]
    fn insufficient_data_message_names_both_counts() {
        let err = ForecastError::InsufficientData { needed: 44, got: 30 };
        let text = err.to_string();
        assert!(text.contains("44"));
        assert!(text.contains("30"));
    }
}
