//! Forecasting models for daily case series

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

pub mod arima;
pub mod sequence;

/// The two model families compared by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelVariant {
    /// Grid-searched ARIMA
    Classical,
    /// Stacked bidirectional LSTM
    Learned,
}

impl Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVariant::Classical => write!(f, "classical"),
            ModelVariant::Learned => write!(f, "learned"),
        }
    }
}

/// Forecast of a model over a date range, with the values actually observed there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    model: String,
    variant: ModelVariant,
    start: NaiveDate,
    end: NaiveDate,
    actual: Vec<f64>,
    predicted: Vec<f64>,
}

impl ForecastResult {
    /// Create a new forecast result covering `start..=end`, one value per day
    pub fn new(
        model: impl Into<String>,
        variant: ModelVariant,
        start: NaiveDate,
        actual: Vec<f64>,
        predicted: Vec<f64>,
    ) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(ForecastError::ValidationError(format!(
                "Actual length ({}) doesn't match predicted length ({})",
                actual.len(),
                predicted.len()
            )));
        }
        if actual.is_empty() {
            return Err(ForecastError::ValidationError(
                "Forecast result must cover at least one day".to_string(),
            ));
        }

        let end = start + chrono::Duration::days(actual.len() as i64 - 1);
        Ok(Self {
            model: model.into(),
            variant,
            start,
            end,
            actual,
            predicted,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn actual(&self) -> &[f64] {
        &self.actual
    }

    pub fn predicted(&self) -> &[f64] {
        &self.predicted
    }

    /// Number of forecast days
    pub fn horizon(&self) -> usize {
        self.predicted.len()
    }
}

/// Forecast model that can be trained
pub trait ForecastModel: Debug + Clone {
    /// What the model is trained on
    type Input: ?Sized;

    /// The type of trained model produced
    type Trained: Debug;

    /// Train the model
    fn train(&self, data: &Self::Input) -> Result<Self::Trained>;

    /// Get the name of the model
    fn name(&self) -> &str;
}
