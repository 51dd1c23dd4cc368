//! Lookback windows for the sequence model
//!
//! Window `i` takes feature rows `[i, i + lookback)` as input and the target column over
//! `[i + lookback, i + lookback + horizon)` as its label. Windows are split by index into
//! train, validation and test; the scaler only ever sees rows reachable from training
//! windows.

use crate::config::{ForecastConfig, SplitRatios};
use crate::error::{ForecastError, Result};
use crate::features::FeatureFrame;
use crate::scaling::{FeatureScaler, ScalerKind};
use chrono::NaiveDate;
use tracing::{debug, info};

/// One scaled input slice with its multi-step label
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceWindow {
    /// Position in the ordered window list
    pub index: usize,
    /// Date of the first input row
    pub start_date: NaiveDate,
    /// Date of the first target day
    pub target_start: NaiveDate,
    /// `lookback` scaled feature rows
    pub inputs: Vec<Vec<f64>>,
    /// Scaled target values, one per horizon day
    pub targets: Vec<f64>,
    /// Unscaled target values
    pub raw_targets: Vec<f64>,
}

/// Scaled windows split into time-ordered partitions
#[derive(Debug, Clone)]
pub struct WindowedDataset {
    pub train: Vec<SequenceWindow>,
    pub validation: Vec<SequenceWindow>,
    pub test: Vec<SequenceWindow>,
    pub scaler: FeatureScaler,
    pub target_index: usize,
    pub lookback: usize,
    pub horizon: usize,
    pub n_features: usize,
    /// Why the configured scaler was replaced by the standard one, if it was
    pub scaler_fallback: Option<String>,
}

impl WindowedDataset {
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds [`WindowedDataset`]s from a [`FeatureFrame`]
#[derive(Debug, Clone)]
pub struct SequenceWindower {
    lookback: usize,
    horizon: usize,
    ratios: SplitRatios,
    scaler: ScalerKind,
}

impl SequenceWindower {
    pub fn new(lookback: usize, horizon: usize) -> Self {
        Self {
            lookback,
            horizon,
            ratios: SplitRatios::default(),
            scaler: ScalerKind::default(),
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            lookback: config.lookback_days,
            horizon: config.horizon_days,
            ratios: config.split,
            scaler: config.scaler,
        }
    }

    pub fn with_ratios(mut self, ratios: SplitRatios) -> Self {
        self.ratios = ratios;
        self
    }

    pub fn with_scaler(mut self, scaler: ScalerKind) -> Self {
        self.scaler = scaler;
        self
    }

    /// Number of windows a series of `n_rows` days yields
    pub fn window_count(&self, n_rows: usize) -> Result<usize> {
        let span = self.lookback + self.horizon;
        if n_rows < span {
            return Err(ForecastError::InsufficientData {
                needed: span,
                got: n_rows,
            });
        }
        Ok(n_rows - span + 1)
    }

    /// `(train, validation, test)` window counts; the test partition takes the remainder
    pub fn split_counts(&self, n_windows: usize) -> (usize, usize, usize) {
        let train = (n_windows as f64 * self.ratios.train).floor() as usize;
        let validation = (n_windows as f64 * self.ratios.validation).floor() as usize;
        let test = n_windows.saturating_sub(train + validation);
        (train, validation, test)
    }

    /// Smallest window count giving every partition at least one window
    fn min_windows(&self) -> usize {
        (1..)
            .find(|&n| {
                let (train, validation, test) = self.split_counts(n);
                train > 0 && validation > 0 && test > 0
            })
            .unwrap_or(usize::MAX)
    }

    pub fn build(&self, frame: &FeatureFrame) -> Result<WindowedDataset> {
        let n_rows = frame.n_rows();
        let n_windows = self.window_count(n_rows)?;
        let (n_train, n_validation, _) = self.split_counts(n_windows);

        let min_windows = self.min_windows();
        if n_windows < min_windows {
            return Err(ForecastError::InsufficientData {
                needed: self.lookback + self.horizon + min_windows - 1,
                got: n_rows,
            });
        }

        let target_index = frame.target_index();
        let rows = frame.rows();
        let fit_rows = &rows[..n_train - 1 + self.lookback + self.horizon];

        let (scaler, scaler_fallback) = match FeatureScaler::fit(self.scaler, fit_rows, target_index) {
            Ok(scaler) => (scaler, None),
            Err(err) => {
                debug!(%err, "configured scaler failed, using standard normalisation");
                (FeatureScaler::standard(fit_rows)?, Some(err.to_string()))
            }
        };

        let scaled: Vec<Vec<f64>> = rows.iter().map(|row| scaler.transform_row(row)).collect();
        let dates = frame.dates();

        let mut windows: Vec<SequenceWindow> = (0..n_windows)
            .map(|i| {
                let target_range = i + self.lookback..i + self.lookback + self.horizon;
                SequenceWindow {
                    index: i,
                    start_date: dates[i],
                    target_start: dates[i + self.lookback],
                    inputs: scaled[i..i + self.lookback].to_vec(),
                    targets: scaled[target_range.clone()]
                        .iter()
                        .map(|row| row[target_index])
                        .collect(),
                    raw_targets: rows[target_range].iter().map(|row| row[target_index]).collect(),
                }
            })
            .collect();

        let test = windows.split_off(n_train + n_validation);
        let validation = windows.split_off(n_train);
        let train = windows;

        info!(
            windows = n_windows,
            train = train.len(),
            validation = validation.len(),
            test = test.len(),
            scaler = ?scaler.kind(),
            "sequence windows built"
        );

        Ok(WindowedDataset {
            train,
            validation,
            test,
            n_features: frame.n_columns(),
            scaler,
            target_index,
            lookback: self.lookback,
            horizon: self.horizon,
            scaler_fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSynthesizer;
    use crate::series::SeriesBuilder;
    use pretty_assertions::assert_eq;

    fn frame(days: usize) -> FeatureFrame {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let counts: Vec<f64> = (0..days).map(|t| 5.0 + (t % 7) as f64 + (t / 10) as f64).collect();
        let series = SeriesBuilder::new(1.0)
            .with_noise(false)
            .build_from_counts(start, &counts)
            .unwrap();
        FeatureSynthesizer::new().synthesize(&series).unwrap()
    }

    #[test]
    fn hundred_days_yield_57_windows() {
        let windower = SequenceWindower::new(30, 14);
        assert_eq!(windower.window_count(100).unwrap(), 57);
        assert_eq!(windower.split_counts(57), (34, 11, 12));

        let dataset = windower.build(&frame(100)).unwrap();
        assert_eq!(dataset.len(), 57);
        assert_eq!(dataset.train.len(), 34);
        assert_eq!(dataset.validation.len(), 11);
        assert_eq!(dataset.test.len(), 12);
    }

    #[test]
    fn partitions_are_ordered_and_disjoint() {
        let dataset = SequenceWindower::new(30, 14).build(&frame(100)).unwrap();
        let indices: Vec<usize> = dataset
            .train
            .iter()
            .chain(&dataset.validation)
            .chain(&dataset.test)
            .map(|w| w.index)
            .collect();
        assert_eq!(indices, (0..57).collect::<Vec<_>>());
        let last_train = dataset.train.last().unwrap().index;
        assert!(dataset.validation.iter().all(|w| w.index > last_train));
    }

    #[test]
    fn window_shapes_and_targets_line_up() {
        let frame = frame(100);
        let dataset = SequenceWindower::new(30, 14).build(&frame).unwrap();
        let window = &dataset.test[0];

        assert_eq!(window.inputs.len(), 30);
        assert!(window.inputs.iter().all(|row| row.len() == frame.n_columns()));
        assert_eq!(window.targets.len(), 14);
        assert_eq!(window.start_date, frame.dates()[window.index]);
        assert_eq!(window.target_start, frame.dates()[window.index + 30]);

        let cases = frame.column("cases").unwrap();
        assert_eq!(window.raw_targets, cases[window.index + 30..window.index + 44].to_vec());

        let last = dataset.test.last().unwrap();
        assert_eq!(*last.raw_targets.last().unwrap(), cases[99]);
    }

    #[test]
    fn scaler_only_sees_training_rows() {
        let frame = frame(100);
        let dataset = SequenceWindower::new(30, 14).build(&frame).unwrap();
        let cases = frame.column("cases").unwrap();
        // 34 training windows reach row 33 + 44 - 1
        let max_seen = cases[..77].iter().copied().fold(f64::MIN, f64::max);
        assert!((dataset.scaler.transform_value(0, max_seen) - 1.0).abs() < 1e-12);
        assert!(cases[77..].iter().any(|&v| dataset.scaler.transform_value(0, v) > 1.0));
    }

    #[test]
    fn short_series_is_insufficient() {
        let err = SequenceWindower::new(30, 14).build(&frame(40));
        assert!(matches!(
            err,
            Err(ForecastError::InsufficientData { needed: 44, got: 40 })
        ));

        let err = SequenceWindower::new(30, 14).build(&frame(46));
        assert!(matches!(err, Err(ForecastError::InsufficientData { .. })));
    }
}
