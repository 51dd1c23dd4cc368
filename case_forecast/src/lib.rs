//! # Case Forecast
//!
//! Daily case-count forecasting for a single disease series.
//!
//! ## Features
//!
//! - Encounter record ingestion from CSV with header-based date detection
//! - Dense daily series with a seeded low-value (zero) handling policy
//! - Calendar, lag, rolling, momentum, oscillator and regime features
//! - Augmented Dickey-Fuller stationarity analysis
//! - ARIMA order grid search by AIC (parallel over candidates)
//! - Stacked bidirectional LSTM trained on scaled lookback windows
//! - Shared evaluation metrics and a per-metric model comparison
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use case_forecast::artifacts::RunArtifacts;
//! use case_forecast::config::{DiseaseContext, ForecastConfig};
//! use case_forecast::pipeline::ForecastPipeline;
//! use case_forecast::records::RecordLoader;
//!
//! # fn main() -> case_forecast::Result<()> {
//! let records = RecordLoader::from_csv("encounters.csv")?;
//!
//! let config = ForecastConfig::from_json_file("forecast.json")?;
//! let report = ForecastPipeline::new(config)?.run(&records)?;
//!
//! println!("{}", report.classical_metrics);
//! println!("recommended: {}", report.recommendation.winner);
//!
//! let artifacts = RunArtifacts::from_report(
//!     &report,
//!     DiseaseContext::new("influenza").with_icd_codes(["J10", "J11"]),
//!     chrono::Utc::now(),
//! );
//! artifacts.write_json("influenza.json")?;
//! # Ok(())
//! # }
//! ```
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod artifacts;
pub mod comparator;
pub mod config;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;
pub mod optimization;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod scaling;
pub mod series;
pub mod stationarity;
pub mod utils;
pub mod windowing;

pub use error::{ForecastError, Result};
pub use pipeline::{run, ForecastPipeline, RunReport};
