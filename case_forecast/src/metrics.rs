//! Metrics for evaluating forecast performance

use crate::error::{ForecastError, Result};
use crate::models::ForecastResult;
use serde::{Deserialize, Serialize};

/// Guard added to actual values in the MAPE denominator
pub const MAPE_EPSILON: f64 = 1e-8;

/// Days with an actual value at most `floor + LOW_VALUE_MARGIN` count as low-value
pub const LOW_VALUE_MARGIN: f64 = 0.1;

/// A low-value prediction is correct within this absolute error
pub const LOW_VALUE_TOLERANCE: f64 = 0.5;

/// Metric suite shared by both model families
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Mean Squared Error
    pub mse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Coefficient of determination
    pub r2: f64,
    /// Mean Absolute Percentage Error
    pub mape: f64,
    /// Percentage of low-value days predicted within tolerance; `None` without such days
    pub low_value_accuracy: Option<f64>,
    /// Number of compared days
    pub n: usize,
}

impl std::fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Performance Metrics ({} days):", self.n)?;
        writeln!(f, "  MSE:     {:.4}", self.mse)?;
        writeln!(f, "  MAE:     {:.4}", self.mae)?;
        writeln!(f, "  RMSE:    {:.4}", self.rmse)?;
        writeln!(f, "  R2:      {:.4}", self.r2)?;
        writeln!(f, "  MAPE:    {:.4}%", self.mape)?;
        match self.low_value_accuracy {
            Some(acc) => writeln!(f, "  Low-value accuracy: {:.2}%", acc)?,
            None => writeln!(f, "  Low-value accuracy: n/a")?,
        }
        Ok(())
    }
}

fn check_inputs(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return Err(ForecastError::ValidationError(format!(
            "Actual and predicted values must have the same non-zero length, got {} and {}",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.iter().chain(predicted).any(|v| !v.is_finite()) {
        return Err(ForecastError::ValidationError(
            "Cannot evaluate NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

/// Evaluate `predicted` against `actual`; `floor` sets the low-value threshold
pub fn evaluate(actual: &[f64], predicted: &[f64], floor: f64) -> Result<EvaluationReport> {
    check_inputs(actual, predicted)?;

    let mse = mean_squared_error(actual, predicted)?;
    Ok(EvaluationReport {
        mse,
        mae: mean_absolute_error(actual, predicted)?,
        rmse: mse.sqrt(),
        r2: r_squared(actual, predicted)?,
        mape: mean_absolute_percentage_error(actual, predicted)?,
        low_value_accuracy: low_value_accuracy(actual, predicted, floor)?,
        n: actual.len(),
    })
}

/// Evaluate a [`ForecastResult`]
pub fn evaluate_result(result: &ForecastResult, floor: f64) -> Result<EvaluationReport> {
    evaluate(result.actual(), result.predicted(), floor)
}

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_inputs(actual, predicted)?;
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Ok(sum / actual.len() as f64)
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_inputs(actual, predicted)?;
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    Ok(sum / actual.len() as f64)
}

/// `1 - SS_res / SS_tot`; a constant actual series scores 1 only when matched exactly
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_inputs(actual, predicted)?;
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    if ss_tot <= f64::EPSILON {
        return Ok(if ss_res <= f64::EPSILON { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// `mean(|a - p| / (a + eps)) * 100`
pub fn mean_absolute_percentage_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_inputs(actual, predicted)?;
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs() / (a + MAPE_EPSILON))
        .sum();
    Ok(sum / actual.len() as f64 * 100.0)
}

/// Share of days with `actual <= floor + 0.1` predicted within 0.5, as a percentage
pub fn low_value_accuracy(actual: &[f64], predicted: &[f64], floor: f64) -> Result<Option<f64>> {
    check_inputs(actual, predicted)?;
    let threshold = floor + LOW_VALUE_MARGIN;
    let (hits, total) = actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a <= threshold)
        .fold((0usize, 0usize), |(hits, total), (a, p)| {
            let hit = (a - p).abs() <= LOW_VALUE_TOLERANCE;
            (hits + usize::from(hit), total + 1)
        });

    Ok((total > 0).then(|| hits as f64 / total as f64 * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn mape_on_all_zeros_is_zero() {
        let zeros = [0.0, 0.0, 0.0];
        assert_eq!(mean_absolute_percentage_error(&zeros, &zeros).unwrap(), 0.0);
    }

    #[test]
    fn perfect_prediction_has_unit_r2() {
        let actual = [3.0, 5.0, 8.0, 2.0];
        let report = evaluate(&actual, &actual, 1.0).unwrap();
        assert_eq!(report.r2, 1.0);
        assert_eq!(report.mse, 0.0);
        assert_eq!(report.mape, 0.0);
        assert_eq!(report.n, 4);
    }

    #[test]
    fn known_errors() {
        let actual = [2.0, 4.0, 6.0, 8.0];
        let predicted = [3.0, 4.0, 4.0, 8.0];
        let report = evaluate(&actual, &predicted, 1.0).unwrap();

        assert_relative_eq!(report.mse, 1.25);
        assert_relative_eq!(report.mae, 0.75);
        assert_relative_eq!(report.rmse, 1.25_f64.sqrt());
        assert_relative_eq!(report.r2, 1.0 - 5.0 / 20.0);
        assert_relative_eq!(report.mape, (0.5 + 1.0 / 3.0) / 4.0 * 100.0, epsilon = 1e-6);
        assert_eq!(report.low_value_accuracy, None);
    }

    #[test]
    fn constant_actuals_score_zero_r2_unless_matched() {
        assert_eq!(r_squared(&[2.0, 2.0], &[2.0, 3.0]).unwrap(), 0.0);
        assert_eq!(r_squared(&[2.0, 2.0], &[2.0, 2.0]).unwrap(), 1.0);
    }

    #[rstest]
    #[case(&[1.0, 1.05, 5.0, 1.1], &[1.2, 2.0, 5.0, 1.5], Some(200.0 / 3.0))]
    #[case(&[1.0, 1.0], &[1.0, 1.4], Some(100.0))]
    #[case(&[4.0, 6.0], &[1.0, 1.0], None)]
    fn low_value_accuracy_cases(
        #[case] actual: &[f64],
        #[case] predicted: &[f64],
        #[case] expected: Option<f64>,
    ) {
        let got = low_value_accuracy(actual, predicted, 1.0).unwrap();
        match (got, expected) {
            (Some(g), Some(e)) => assert_relative_eq!(g, e, epsilon = 1e-9),
            (g, e) => assert_eq!(g, e),
        }
    }

    #[test]
    fn invalid_inputs_are_validation_errors() {
        assert!(matches!(
            evaluate(&[1.0, f64::NAN], &[1.0, 2.0], 1.0),
            Err(ForecastError::ValidationError(_))
        ));
        assert!(matches!(
            evaluate(&[1.0], &[1.0, 2.0], 1.0),
            Err(ForecastError::ValidationError(_))
        ));
        assert!(matches!(evaluate(&[], &[], 1.0), Err(ForecastError::ValidationError(_))));
    }

    #[test]
    fn infinite_inputs_are_validation_errors() {
        assert!(matches!(
            evaluate(&[1.0, 2.0], &[1.0, f64::INFINITY], 1.0),
            Err(ForecastError::ValidationError(_))
        ));
        assert!(matches!(
            mean_absolute_error(&[f64::NEG_INFINITY], &[1.0]),
            Err(ForecastError::ValidationError(_))
        ));
    }
}
