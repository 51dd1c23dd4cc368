//! Stationarity analysis with the Augmented Dickey-Fuller test
//!
//! The analyzer tests the original series and, when it has a unit root, tries a first
//! difference, a second difference and a weekly seasonal difference in that order.

use crate::error::{ForecastError, Result};
use crate::utils::{difference, ols};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, warn};

/// Significance level below which the unit-root hypothesis is rejected
pub const DEFAULT_SIGNIFICANCE: f64 = 0.05;

/// Period of the seasonal difference tried last
pub const SEASONAL_PERIOD: usize = 7;

const MIN_OBSERVATIONS: usize = 10;

// MacKinnon (1994) surface for the constant-only regression
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

/// Outcome of one ADF test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdfResult {
    /// t-statistic of the lagged level coefficient
    pub statistic: f64,
    pub p_value: f64,
    /// Number of lagged differences in the regression
    pub lags: usize,
    pub n_obs: usize,
}

impl AdfResult {
    pub fn is_stationary(&self, significance: f64) -> bool {
        self.p_value <= significance
    }

    fn degenerate(p_value: f64, n_obs: usize) -> Self {
        Self {
            statistic: if p_value == 0.0 {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            },
            p_value,
            lags: 0,
            n_obs,
        }
    }
}

/// Run an ADF test with a constant, choosing the lag order by AIC
pub fn adf_test(series: &[f64]) -> Result<AdfResult> {
    let n = series.len();
    if n < MIN_OBSERVATIONS {
        return Err(ForecastError::InsufficientData {
            needed: MIN_OBSERVATIONS,
            got: n,
        });
    }
    if series.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::DataError(
            "ADF test input contains non-finite values".to_string(),
        ));
    }

    let first = series[0];
    if series.iter().all(|v| (v - first).abs() < 1e-12) {
        return Ok(AdfResult::degenerate(0.0, n));
    }

    let diffs = difference(series, 1);
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize;
    // Leave enough rows for the regression at the largest lag
    let max_lag = schwert.min(diffs.len().saturating_sub(4) / 2);

    // Lag search on a common sample so the AIC values are comparable
    let mut best_lag = 0;
    let mut best_aic = f64::INFINITY;
    for lag in 0..=max_lag {
        let (rows, y) = adf_design(series, &diffs, lag, max_lag);
        if let Some(fit) = ols(&rows, &y) {
            let m = y.len() as f64;
            if !vanishing_residuals(fit.rss, &y) {
                let aic = m * (fit.rss / m).ln() + 2.0 * (lag + 2) as f64;
                if aic < best_aic {
                    best_aic = aic;
                    best_lag = lag;
                }
            }
        }
    }

    let (rows, y) = adf_design(series, &diffs, best_lag, best_lag);
    let n_obs = y.len();
    let Some(fit) = ols(&rows, &y) else {
        return Ok(AdfResult::degenerate(1.0, n_obs));
    };
    if vanishing_residuals(fit.rss, &y) {
        return Ok(AdfResult::degenerate(1.0, n_obs));
    }
    let Some(se) = fit.standard_error(1) else {
        return Ok(AdfResult::degenerate(1.0, n_obs));
    };

    let statistic = fit.coefficients[1] / se;
    let p_value = mackinnon_p_value(statistic);
    debug!(statistic, p_value, lags = best_lag, n_obs, "ADF test");

    Ok(AdfResult {
        statistic,
        p_value,
        lags: best_lag,
        n_obs,
    })
}

fn vanishing_residuals(rss: f64, y: &[f64]) -> bool {
    let scale: f64 = y.iter().map(|v| v * v).sum();
    rss <= 1e-10 * scale.max(f64::MIN_POSITIVE)
}

/// Regression rows `[1, y_{t-1}, dy_{t-1}..dy_{t-lag}]` against `dy_t`, starting at `skip`
fn adf_design(
    series: &[f64],
    diffs: &[f64],
    lag: usize,
    skip: usize,
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rows = Vec::with_capacity(diffs.len().saturating_sub(skip));
    let mut y = Vec::with_capacity(rows.capacity());
    // diffs[t] = series[t+1] - series[t]
    for t in skip..diffs.len() {
        let mut row = Vec::with_capacity(lag + 2);
        row.push(1.0);
        row.push(series[t]);
        row.extend((1..=lag).map(|i| diffs[t - i]));
        rows.push(row);
        y.push(diffs[t]);
    }
    (rows, y)
}

/// Approximate p-value of an ADF statistic for the constant-only regression
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    if statistic.is_nan() {
        return 1.0;
    }
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }

    let coefficients: &[f64] = if statistic <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };
    let poly = coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * statistic + c);

    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(poly),
        Err(_) => 1.0,
    }
}

/// Transform applied to make a series stationary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Differencing {
    None,
    First,
    Second,
    Seasonal { period: usize },
}

impl Differencing {
    /// Reported differencing order: 0, 1, 2 or the seasonal period
    pub fn order(&self) -> usize {
        match self {
            Differencing::None => 0,
            Differencing::First => 1,
            Differencing::Second => 2,
            Differencing::Seasonal { period } => *period,
        }
    }

    /// Lags of the individual differencing steps, applied left to right
    pub fn lags(&self) -> Vec<usize> {
        match self {
            Differencing::None => Vec::new(),
            Differencing::First => vec![1],
            Differencing::Second => vec![1, 1],
            Differencing::Seasonal { period } => vec![*period],
        }
    }

    pub fn apply(&self, series: &[f64]) -> Vec<f64> {
        self.lags()
            .into_iter()
            .fold(series.to_vec(), |acc, lag| difference(&acc, lag))
    }
}

/// Result of a stationarity analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationarityReport {
    pub transform: Differencing,
    pub stationary: bool,
    /// Test on the untransformed series
    pub original: AdfResult,
    /// Test on the returned series
    pub result: AdfResult,
    pub series: Vec<f64>,
}

/// Picks the smallest differencing that makes a series stationary
#[derive(Debug, Clone, Copy)]
pub struct StationarityAnalyzer {
    significance: f64,
}

impl Default for StationarityAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNIFICANCE)
    }
}

impl StationarityAnalyzer {
    pub fn new(significance: f64) -> Self {
        Self { significance }
    }

    pub fn significance(&self) -> f64 {
        self.significance
    }

    pub fn analyze(&self, series: &[f64]) -> Result<StationarityReport> {
        let original = adf_test(series)?;
        if original.is_stationary(self.significance) {
            return Ok(StationarityReport {
                transform: Differencing::None,
                stationary: true,
                original,
                result: original,
                series: series.to_vec(),
            });
        }

        let candidates = [
            Differencing::First,
            Differencing::Second,
            Differencing::Seasonal {
                period: SEASONAL_PERIOD,
            },
        ];
        for transform in candidates {
            let transformed = transform.apply(series);
            let result = match adf_test(&transformed) {
                Ok(result) => result,
                Err(err) => {
                    debug!(order = transform.order(), %err, "skipping differencing");
                    continue;
                }
            };
            if result.is_stationary(self.significance) {
                debug!(order = transform.order(), p_value = result.p_value, "stationary after differencing");
                return Ok(StationarityReport {
                    transform,
                    stationary: true,
                    original,
                    result,
                    series: transformed,
                });
            }
        }

        warn!(
            p_value = original.p_value,
            "series is not stationary under any differencing, using it unchanged"
        );
        Ok(StationarityReport {
            transform: Differencing::None,
            stationary: false,
            original,
            result: original,
            series: series.to_vec(),
        })
    }
}
