//! # Casecast
//!
//! Workspace facade for the daily case-count forecasting crates.
//!
//! - [`case_math`]: streaming indicators (moving averages, RSI, MACD, bands, slope,
//!   autocorrelation)
//! - [`case_forecast`]: series building, feature synthesis, stationarity analysis, ARIMA
//!   and recurrent models, evaluation and comparison
//!
//! ```
//! use casecast_workspace::case_math::SimpleMovingAverage;
//!
//! let mut sma = SimpleMovingAverage::new(3).unwrap();
//! for v in [4.0, 6.0, 8.0] {
//!     sma.update(v).unwrap();
//! }
//! assert_eq!(sma.value().unwrap(), 6.0);
//! ```

pub use case_forecast;
pub use case_math;

pub use case_forecast::{run, ForecastError, ForecastPipeline, RunReport};
