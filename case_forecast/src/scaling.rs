//! Feature-wise scaling for the sequence model

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};

/// Which statistics a [`FeatureScaler`] centres and divides by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    /// `(x - min) / (max - min)`
    #[default]
    MinMax,
    /// `(x - median) / IQR`
    Robust,
    /// `(x - mean) / std`
    Standard,
}

/// Per-column affine scaler: `scaled = (x - offset) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    kind: ScalerKind,
    offsets: Vec<f64>,
    scales: Vec<f64>,
}

impl FeatureScaler {
    /// Fit on training rows
    ///
    /// Fails on empty, ragged or non-finite input and when the `target` column has no
    /// spread. Other constant columns are only centred.
    pub fn fit(kind: ScalerKind, rows: &[Vec<f64>], target: usize) -> Result<Self> {
        let columns = columns_of(rows)?;
        if target >= columns.len() {
            return Err(ForecastError::ScalingFailure(format!(
                "target column {} out of range for {} columns",
                target,
                columns.len()
            )));
        }

        let mut offsets = Vec::with_capacity(columns.len());
        let mut scales = Vec::with_capacity(columns.len());
        for (idx, column) in columns.into_iter().enumerate() {
            let (offset, scale) = match kind {
                ScalerKind::MinMax => {
                    let min = column.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    (min, max - min)
                }
                ScalerKind::Robust => {
                    let mut data = Data::new(column);
                    let median = data.median();
                    (median, data.upper_quartile() - data.lower_quartile())
                }
                ScalerKind::Standard => (column.iter().mean(), column.iter().population_std_dev()),
            };

            if !(scale.is_finite() && scale > f64::EPSILON) {
                if idx == target {
                    return Err(ForecastError::ScalingFailure(format!(
                        "{:?} scaler found no spread in the target column",
                        kind
                    )));
                }
                scales.push(1.0);
            } else {
                scales.push(scale);
            }
            offsets.push(offset);
        }

        Ok(Self {
            kind,
            offsets,
            scales,
        })
    }

    /// `(x - mean) / std` with constant columns only centred; never fails on spread
    pub fn standard(rows: &[Vec<f64>]) -> Result<Self> {
        let columns = columns_of(rows)?;
        let (offsets, scales) = columns
            .iter()
            .map(|column| {
                let std = column.iter().population_std_dev();
                let scale = if std.is_finite() && std > f64::EPSILON {
                    std
                } else {
                    1.0
                };
                (column.iter().mean(), scale)
            })
            .unzip();

        Ok(Self {
            kind: ScalerKind::Standard,
            offsets,
            scales,
        })
    }

    pub fn kind(&self) -> ScalerKind {
        self.kind
    }

    pub fn n_features(&self) -> usize {
        self.offsets.len()
    }

    pub fn transform_value(&self, column: usize, value: f64) -> f64 {
        (value - self.offsets[column]) / self.scales[column]
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(idx, &value)| self.transform_value(idx, value))
            .collect()
    }

    pub fn inverse_transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.offsets.iter().zip(&self.scales))
            .map(|(value, (offset, scale))| value * scale + offset)
            .collect()
    }

    /// Undo scaling of one column by rebuilding a full-width row around it
    pub fn inverse_value(&self, column: usize, value: f64) -> f64 {
        let mut row = vec![0.0; self.n_features()];
        row[column] = value;
        self.inverse_transform_row(&row)[column]
    }
}

fn columns_of(rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let width = rows
        .first()
        .map(Vec::len)
        .ok_or_else(|| ForecastError::ScalingFailure("no rows to fit on".to_string()))?;
    if width == 0 {
        return Err(ForecastError::ScalingFailure("rows have no columns".to_string()));
    }

    let mut columns = vec![Vec::with_capacity(rows.len()); width];
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(ForecastError::ScalingFailure(format!(
                "row {} has {} columns, expected {}",
                idx,
                row.len(),
                width
            )));
        }
        for (column, &value) in columns.iter_mut().zip(row) {
            if !value.is_finite() {
                return Err(ForecastError::ScalingFailure(format!(
                    "non-finite value in row {}",
                    idx
                )));
            }
            column.push(value);
        }
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn rows() -> Vec<Vec<f64>> {
        vec![
            vec![2.0, 7.0, 1.0],
            vec![4.0, 7.0, 0.0],
            vec![6.0, 7.0, 1.0],
            vec![8.0, 7.0, 0.0],
            vec![10.0, 7.0, 1.0],
        ]
    }

    #[test]
    fn min_max_maps_training_range_to_unit_interval() {
        let scaler = FeatureScaler::fit(ScalerKind::MinMax, &rows(), 0).unwrap();
        assert_eq!(scaler.transform_row(&[2.0, 7.0, 0.0]), vec![0.0, 0.0, 0.0]);
        assert_eq!(scaler.transform_row(&[10.0, 7.0, 1.0]), vec![1.0, 0.0, 1.0]);
        assert_relative_eq!(scaler.transform_value(0, 14.0), 1.5);
    }

    #[rstest]
    #[case(ScalerKind::MinMax)]
    #[case(ScalerKind::Robust)]
    #[case(ScalerKind::Standard)]
    fn inverse_recovers_target(#[case] kind: ScalerKind) {
        let scaler = FeatureScaler::fit(kind, &rows(), 0).unwrap();
        for value in [0.0, 3.5, 12.0] {
            let scaled = scaler.transform_value(0, value);
            assert_relative_eq!(scaler.inverse_value(0, scaled), value, epsilon = 1e-9);
        }
    }

    #[test]
    fn flat_target_fails_but_standard_fallback_centres() {
        let err = FeatureScaler::fit(ScalerKind::MinMax, &rows(), 1);
        assert!(matches!(err, Err(ForecastError::ScalingFailure(_))));

        let fallback = FeatureScaler::standard(&rows()).unwrap();
        assert_eq!(fallback.kind(), ScalerKind::Standard);
        assert_relative_eq!(fallback.transform_value(1, 7.0), 0.0);
        assert_relative_eq!(fallback.transform_value(0, 6.0), 0.0);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(FeatureScaler::fit(ScalerKind::Standard, &[], 0).is_err());
        let ragged = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(FeatureScaler::fit(ScalerKind::MinMax, &ragged, 0).is_err());
        let nan = vec![vec![1.0], vec![f64::NAN]];
        assert!(FeatureScaler::standard(&nan).is_err());
    }
}
