//! ARIMA models for daily case forecasting
//!
//! Candidates are fit by conditional sum of squares with Nelder-Mead and ranked by
//! Gaussian AIC. The grid search runs candidates in parallel and reduces to the minimum
//! AIC, breaking ties by `(p, d, q)` order so the choice is deterministic.

use crate::config::GridBounds;
use crate::error::{ForecastError, Result};
use crate::models::ForecastModel;
use crate::optimization::{nelder_mead, NelderMeadConfig};
use crate::stationarity::{Differencing, StationarityAnalyzer, StationarityReport};
use crate::utils::{difference, undifference};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::f64::consts::PI;
use std::fmt;
use tracing::{debug, info};

/// Bound on AR and MA coefficients during fitting
const COEFFICIENT_BOUND: f64 = 0.99;

/// Lower bound on the residual variance used in the likelihood
const MIN_VARIANCE: f64 = 1e-10;

/// An `(p, d, q)` configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ModelOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Every order within `bounds`, in canonical order
    pub fn grid(bounds: &GridBounds) -> Vec<ModelOrder> {
        let mut orders = Vec::new();
        for p in 0..=bounds.max_p {
            for d in 0..=bounds.max_d {
                for q in 0..=bounds.max_q {
                    orders.push(ModelOrder::new(p, d, q));
                }
            }
        }
        orders
    }

    /// Estimated parameters: AR, MA and the mean
    pub fn n_params(&self) -> usize {
        self.p + self.q + 1
    }
}

impl fmt::Display for ModelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

/// ARIMA model (AutoRegressive Integrated Moving Average)
#[derive(Debug, Clone)]
pub struct ArimaModel {
    name: String,
    order: ModelOrder,
    /// Stationarity transform applied before the `d` regular differences
    transform: Differencing,
    optimizer: NelderMeadConfig,
}

impl ArimaModel {
    /// Create a new ARIMA model
    pub fn new(order: ModelOrder) -> Self {
        Self {
            name: format!("ARIMA{}", order),
            order,
            transform: Differencing::None,
            optimizer: NelderMeadConfig::default(),
        }
    }

    /// Difference with `transform` first, then `d` more times
    pub fn with_transform(mut self, transform: Differencing) -> Self {
        self.transform = transform;
        if transform != Differencing::None {
            self.name = format!("ARIMA{} after {}-order differencing", self.order, transform.order());
        }
        self
    }

    pub fn order(&self) -> ModelOrder {
        self.order
    }

    pub fn transform(&self) -> Differencing {
        self.transform
    }

    /// Lags of every differencing step, in application order
    fn lags(&self) -> Vec<usize> {
        let mut lags = self.transform.lags();
        lags.extend(std::iter::repeat(1).take(self.order.d));
        lags
    }
}

/// One-step predictions and residuals of an ARMA recursion over `series`
fn arma_residuals(series: &[f64], mean: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let start = ar.len().max(ma.len());
    let mut residuals = vec![0.0; series.len()];
    for t in start..series.len() {
        let mut pred = mean;
        for (i, phi) in ar.iter().enumerate() {
            pred += phi * (series[t - 1 - i] - mean);
        }
        for (i, theta) in ma.iter().enumerate() {
            pred += theta * residuals[t - 1 - i];
        }
        residuals[t] = series[t] - pred;
    }
    residuals
}

fn conditional_sum_of_squares(series: &[f64], mean: f64, ar: &[f64], ma: &[f64]) -> f64 {
    let start = ar.len().max(ma.len());
    let css: f64 = arma_residuals(series, mean, ar, ma)[start..]
        .iter()
        .map(|e| e * e)
        .sum();
    if css.is_finite() {
        css
    } else {
        f64::MAX
    }
}

impl ForecastModel for ArimaModel {
    type Input = [f64];
    type Trained = TrainedArimaModel;

    fn train(&self, data: &[f64]) -> Result<TrainedArimaModel> {
        let lags = self.lags();
        let mut levels = vec![data.to_vec()];
        for &lag in &lags {
            let next = difference(levels[levels.len() - 1].as_slice(), lag);
            levels.push(next);
        }
        let working = &levels[levels.len() - 1];

        let ModelOrder { p, q, .. } = self.order;
        let start = p.max(q);
        let needed = start + self.order.n_params() + 1;
        if working.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed: needed + lags.iter().sum::<usize>(),
                got: data.len(),
            });
        }

        let sample_mean = working.iter().sum::<f64>() / working.len() as f64;
        let (mean, ar, ma) = if p == 0 && q == 0 {
            (sample_mean, Vec::new(), Vec::new())
        } else {
            let mut initial = vec![sample_mean];
            initial.extend((0..p).map(|i| 0.1 / (i + 1) as f64));
            initial.extend((0..q).map(|i| 0.1 / (i + 1) as f64));

            let mut bounds = vec![(f64::NEG_INFINITY, f64::INFINITY)];
            bounds.extend(std::iter::repeat((-COEFFICIENT_BOUND, COEFFICIENT_BOUND)).take(p + q));

            let result = nelder_mead(
                |params| {
                    conditional_sum_of_squares(working, params[0], &params[1..1 + p], &params[1 + p..])
                },
                &initial,
                &bounds,
                self.optimizer,
            );
            if !result.converged || result.value >= f64::MAX {
                return Err(ForecastError::Convergence(format!(
                    "{} did not converge after {} iterations",
                    self.name, result.iterations
                )));
            }
            let point = result.point;
            (point[0], point[1..1 + p].to_vec(), point[1 + p..].to_vec())
        };

        let residuals = arma_residuals(working, mean, &ar, &ma);
        let n_eff = (working.len() - start) as f64;
        let css: f64 = residuals[start..].iter().map(|e| e * e).sum();
        let variance = (css / n_eff).max(MIN_VARIANCE);
        let aic = n_eff * (1.0 + (2.0 * PI * variance).ln()) + 2.0 * self.order.n_params() as f64;
        if !aic.is_finite() || !mean.is_finite() {
            return Err(ForecastError::Convergence(format!(
                "{} produced a non-finite fit",
                self.name
            )));
        }

        Ok(TrainedArimaModel {
            name: self.name.clone(),
            order: self.order,
            transform: self.transform,
            mean,
            ar,
            ma,
            variance,
            aic,
            lags,
            levels,
            residuals,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Trained ARIMA model
#[derive(Debug, Clone)]
pub struct TrainedArimaModel {
    name: String,
    order: ModelOrder,
    transform: Differencing,
    mean: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    variance: f64,
    aic: f64,
    lags: Vec<usize>,
    /// The training series after each differencing step, starting with the raw series
    levels: Vec<Vec<f64>>,
    residuals: Vec<f64>,
}

impl TrainedArimaModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> ModelOrder {
        self.order
    }

    pub fn transform(&self) -> Differencing {
        self.transform
    }

    /// Mean of the differenced series
    pub fn intercept(&self) -> f64 {
        self.mean
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma
    }

    pub fn residual_variance(&self) -> f64 {
        self.variance
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    /// Forecast `horizon` days past the end of the training series
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        if horizon == 0 {
            return Vec::new();
        }

        let working = &self.levels[self.levels.len() - 1];
        let mut extended = working.clone();
        let mut residuals = self.residuals.clone();
        for _ in 0..horizon {
            let t = extended.len();
            let mut pred = self.mean;
            for (i, phi) in self.ar.iter().enumerate() {
                if t > i {
                    pred += phi * (extended[t - 1 - i] - self.mean);
                }
            }
            for (i, theta) in self.ma.iter().enumerate() {
                if t > i {
                    pred += theta * residuals[t - 1 - i];
                }
            }
            extended.push(pred);
            residuals.push(0.0);
        }

        let mut forecast = extended.split_off(working.len());
        for (level, &lag) in self.levels.iter().zip(&self.lags).rev() {
            forecast = undifference(level, &forecast, lag);
        }
        forecast
    }
}

/// Scores from a grid search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchOutcome {
    pub best: ModelOrder,
    pub best_aic: f64,
    /// AIC of every candidate that fit, in canonical order
    pub scores: Vec<(ModelOrder, f64)>,
    /// Candidates that failed to fit
    pub skipped: Vec<ModelOrder>,
}

impl GridSearchOutcome {
    /// Fitted candidates from best to worst
    pub fn ranked(&self) -> Vec<ModelOrder> {
        let mut scores = self.scores.clone();
        scores.sort_by(compare_scores);
        scores.into_iter().map(|(order, _)| order).collect()
    }
}

fn compare_scores(a: &(ModelOrder, f64), b: &(ModelOrder, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0))
}

/// Pick the lowest finite AIC; equal scores go to the smaller order
pub fn select_best(scores: &[(ModelOrder, f64)]) -> Option<(ModelOrder, f64)> {
    scores
        .iter()
        .filter(|(_, aic)| aic.is_finite())
        .min_by(|a, b| compare_scores(a, b))
        .copied()
}

/// Exhaustive `(p, d, q)` search
#[derive(Debug, Clone, Copy, Default)]
pub struct GridSearch {
    bounds: GridBounds,
}

impl GridSearch {
    pub fn new(bounds: GridBounds) -> Self {
        Self { bounds }
    }

    pub fn search(&self, series: &[f64]) -> Result<GridSearchOutcome> {
        let orders = ModelOrder::grid(&self.bounds);
        let fits: Vec<(ModelOrder, Result<f64>)> = orders
            .par_iter()
            .map(|&order| {
                let aic = ArimaModel::new(order).train(series).map(|m| m.aic());
                (order, aic)
            })
            .collect();

        let mut scores = Vec::with_capacity(fits.len());
        let mut skipped = Vec::new();
        for (order, fit) in fits {
            match fit {
                Ok(aic) => scores.push((order, aic)),
                Err(err) => {
                    debug!(%order, %err, "skipping candidate");
                    skipped.push(order);
                }
            }
        }

        let (best, best_aic) = select_best(&scores).ok_or_else(|| {
            ForecastError::Convergence(format!(
                "none of the {} grid candidates could be fit",
                skipped.len()
            ))
        })?;
        debug!(%best, best_aic, candidates = scores.len(), "grid search finished");

        Ok(GridSearchOutcome {
            best,
            best_aic,
            scores,
            skipped,
        })
    }
}

/// Stationarity analysis, order search and final fit for the classical path
#[derive(Debug, Clone, Default)]
pub struct ClassicalFitter {
    analyzer: StationarityAnalyzer,
    grid: GridSearch,
}

/// Everything the classical path produced
#[derive(Debug, Clone)]
pub struct ClassicalFit {
    pub stationarity: StationarityReport,
    pub search: GridSearchOutcome,
    pub model: TrainedArimaModel,
    /// Non-negative forecast of the days after the history
    pub forecast: Vec<f64>,
}

impl ClassicalFitter {
    pub fn new(bounds: GridBounds) -> Self {
        Self {
            analyzer: StationarityAnalyzer::default(),
            grid: GridSearch::new(bounds),
        }
    }

    pub fn with_analyzer(mut self, analyzer: StationarityAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Fit on `history` and forecast the next `horizon` days
    pub fn fit(&self, history: &[f64], horizon: usize) -> Result<ClassicalFit> {
        let stationarity = self.analyzer.analyze(history)?;
        let search = self.grid.search(&stationarity.series)?;

        // The best order can fail once the stationarity transform is added; fall back down the ranking
        for order in search.ranked() {
            let model = ArimaModel::new(order).with_transform(stationarity.transform);
            match model.train(history) {
                Ok(trained) => {
                    let forecast = trained
                        .forecast(horizon)
                        .into_iter()
                        .map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 })
                        .collect();
                    info!(
                        model = trained.name(),
                        aic = trained.aic(),
                        stationarity_order = stationarity.transform.order(),
                        "classical model fitted"
                    );
                    return Ok(ClassicalFit {
                        stationarity,
                        search,
                        model: trained,
                        forecast,
                    });
                }
                Err(err) => debug!(%order, %err, "final fit failed"),
            }
        }

        Err(ForecastError::Convergence(
            "no searched order could be refit on the history".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn ar1_series(n: usize, phi: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut series = vec![20.0];
        for t in 1..n {
            let prev: f64 = series[t - 1];
            series.push(20.0 + phi * (prev - 20.0) + noise.sample(&mut rng));
        }
        series
    }

    #[test]
    fn grid_is_canonical() {
        let grid = ModelOrder::grid(&GridBounds::default());
        assert_eq!(grid.len(), 48);
        assert_eq!(grid[0], ModelOrder::new(0, 0, 0));
        assert_eq!(grid[47], ModelOrder::new(3, 2, 3));
        assert!(grid.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn selects_known_lowest_aic() {
        let scores = vec![
            (ModelOrder::new(0, 0, 0), 310.0),
            (ModelOrder::new(1, 0, 0), 250.5),
            (ModelOrder::new(2, 1, 1), 250.4),
            (ModelOrder::new(3, 2, 3), f64::NAN),
            (ModelOrder::new(1, 1, 0), 260.0),
        ];
        assert_eq!(select_best(&scores), Some((ModelOrder::new(2, 1, 1), 250.4)));
    }

    #[test]
    fn ties_go_to_smaller_order() {
        let scores = vec![
            (ModelOrder::new(2, 0, 0), 100.0),
            (ModelOrder::new(1, 0, 1), 100.0),
        ];
        assert_eq!(select_best(&scores).map(|s| s.0), Some(ModelOrder::new(1, 0, 1)));
        assert_eq!(select_best(&[]), None);
    }

    #[test]
    fn recovers_ar_coefficient() {
        let series = ar1_series(400, 0.6, 3);
        let model = ArimaModel::new(ModelOrder::new(1, 0, 0)).train(&series).unwrap();
        assert_relative_eq!(model.ar_coefficients()[0], 0.6, epsilon = 0.1);
        assert_relative_eq!(model.intercept(), 20.0, epsilon = 0.5);
    }

    #[test]
    fn ar_beats_white_noise_on_autocorrelated_data() {
        let series = ar1_series(300, 0.8, 5);
        let white = ArimaModel::new(ModelOrder::new(0, 0, 0)).train(&series).unwrap();
        let ar = ArimaModel::new(ModelOrder::new(1, 0, 0)).train(&series).unwrap();
        assert!(ar.aic() < white.aic());
    }

    #[test]
    fn differenced_forecast_continues_trend() {
        let series: Vec<f64> = (0..60).map(|t| 5.0 + 2.0 * t as f64).collect();
        let model = ArimaModel::new(ModelOrder::new(0, 1, 0)).train(&series).unwrap();
        let forecast = model.forecast(3);
        assert_relative_eq!(forecast[0], 125.0, epsilon = 1e-9);
        assert_relative_eq!(forecast[2], 129.0, epsilon = 1e-9);
    }

    #[test]
    fn seasonal_transform_repeats_week() {
        let week = [3.0, 5.0, 8.0, 6.0, 4.0, 2.0, 1.0];
        let series: Vec<f64> = (0..70).map(|t| week[t % 7]).collect();
        let model = ArimaModel::new(ModelOrder::new(0, 0, 0))
            .with_transform(Differencing::Seasonal { period: 7 })
            .train(&series)
            .unwrap();
        let forecast = model.forecast(7);
        for (f, w) in forecast.iter().zip(week) {
            assert_relative_eq!(*f, w, epsilon = 1e-9);
        }
    }

    #[test]
    fn too_short_series_is_insufficient() {
        let err = ArimaModel::new(ModelOrder::new(3, 2, 3)).train(&[1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(err, Err(ForecastError::InsufficientData { .. })));
    }

    #[test]
    fn search_picks_minimum_of_its_scores() {
        let series = ar1_series(150, 0.7, 9);
        let outcome = GridSearch::new(GridBounds {
            max_p: 2,
            max_d: 1,
            max_q: 1,
        })
        .search(&series)
        .unwrap();

        assert_eq!(outcome.scores.len() + outcome.skipped.len(), 12);
        assert_eq!(select_best(&outcome.scores).map(|s| s.0), Some(outcome.best));
        assert_eq!(outcome.ranked()[0], outcome.best);
    }

    #[test]
    fn classical_fit_forecasts_non_negative_horizon() {
        let series: Vec<f64> = ar1_series(200, 0.5, 13)
            .into_iter()
            .map(|v| (v - 18.0).max(0.0))
            .collect();
        let fit = ClassicalFitter::new(GridBounds {
            max_p: 1,
            max_d: 1,
            max_q: 1,
        })
        .fit(&series, 14)
        .unwrap();

        assert_eq!(fit.forecast.len(), 14);
        assert!(fit.forecast.iter().all(|v| *v >= 0.0));
    }
}
