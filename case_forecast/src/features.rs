//! Feature synthesis over a daily case series
//!
//! [`FeatureSynthesizer::synthesize`] is a pure function from a [`DailyCaseSeries`] to a
//! [`FeatureFrame`] with a fixed, named column set. Later stages look columns up by name
//! or index, so the order returned by [`feature_names`] never changes between calls.

use crate::error::{ForecastError, Result};
use crate::series::DailyCaseSeries;
use case_math::{
    finite_or, BollingerBands, Macd, RelativeStrengthIndex, RollingAutocorrelation, RollingSlope,
    StandardDeviation,
};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::f64::consts::PI;
use std::fs::File;
use std::path::Path;

/// Name of the raw count column, the target of both model families
pub const TARGET_COLUMN: &str = "cases";

pub const LAGS: [usize; 8] = [1, 2, 3, 7, 14, 21, 28, 30];
pub const ROLLING_WINDOWS: [usize; 4] = [7, 14, 21, 30];
pub const SPIKE_WINDOWS: [usize; 3] = [7, 14, 21];
pub const AUTOCORR_LAGS: [usize; 3] = [1, 7, 14];
pub const AUTOCORR_WINDOW: usize = 30;
pub const RSI_PERIODS: [usize; 2] = [7, 14];
pub const BAND_WINDOWS: [usize; 2] = [20, 30];

const EPSILON: f64 = 1e-8;

/// Canonical column order of every [`FeatureFrame`]
pub fn feature_names() -> Vec<String> {
    let mut names: Vec<String> = [
        TARGET_COLUMN,
        "day_of_week",
        "month",
        "day_of_year",
        "week",
        "quarter",
        "dow_sin",
        "dow_cos",
        "month_sin",
        "month_cos",
        "doy_sin",
        "doy_cos",
        "log_cases",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    for lag in LAGS {
        names.push(format!("lag_{}", lag));
        names.push(format!("log_lag_{}", lag));
    }
    for w in ROLLING_WINDOWS {
        names.push(format!("volatility_{}", w));
        names.push(format!("rolling_mean_{}", w));
        names.push(format!("cv_{}", w));
        names.push(format!("trend_{}", w));
    }
    for lag in LAGS {
        names.push(format!("momentum_{}", lag));
        names.push(format!("log_momentum_{}", lag));
    }
    for w in SPIKE_WINDOWS {
        names.push(format!("spike_{}", w));
        names.push(format!("drop_{}", w));
    }
    for lag in AUTOCORR_LAGS {
        names.push(format!("autocorr_{}", lag));
    }
    for p in RSI_PERIODS {
        names.push(format!("rsi_{}", p));
    }
    names.extend(["macd", "macd_signal", "macd_hist"].iter().map(|s| s.to_string()));
    for w in BAND_WINDOWS {
        names.push(format!("band_upper_{}", w));
        names.push(format!("band_lower_{}", w));
        names.push(format!("band_position_{}", w));
    }
    names.push("is_low".to_string());
    names.push("low_run".to_string());
    names
}

/// Daily series extended with derived columns, one row per day
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    dates: Vec<NaiveDate>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl FeatureFrame {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn n_columns(&self) -> usize {
        self.names.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_index(name).map(|idx| self.columns[idx].as_slice())
    }

    /// Position of [`TARGET_COLUMN`]
    pub fn target_index(&self) -> usize {
        0
    }

    /// One day's values across every column
    pub fn row(&self, index: usize) -> Vec<f64> {
        self.columns.iter().map(|col| col[index]).collect()
    }

    /// All rows, in date order
    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.n_rows()).map(|i| self.row(i)).collect()
    }

    /// Convert to a polars DataFrame with a leading `date` column
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut series = Vec::with_capacity(self.names.len() + 1);
        series.push(Series::new(
            "date",
            self.dates
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect::<Vec<String>>(),
        ));
        for (name, values) in self.names.iter().zip(&self.columns) {
            series.push(Series::new(name.as_str(), values.clone()));
        }

        Ok(DataFrame::new(series)?)
    }

    /// Write the frame as CSV
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).finish(&mut df)?;
        Ok(())
    }
}

/// Derives the calendar, lag, rolling, oscillator and regime columns
#[derive(Debug, Clone, Default)]
pub struct FeatureSynthesizer;

impl FeatureSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize(&self, series: &DailyCaseSeries) -> Result<FeatureFrame> {
        if series.is_empty() {
            return Err(ForecastError::DataError(
                "Cannot derive features from an empty series".to_string(),
            ));
        }

        let values = series.values();
        let floor = series.floor();
        let dates: Vec<NaiveDate> = series.dates().collect();
        let log_values: Vec<f64> = values.iter().map(|v| v.ln_1p()).collect();

        let mut columns: Vec<Vec<f64>> = Vec::new();
        columns.push(values.to_vec());
        columns.extend(calendar_columns(&dates));
        columns.push(log_values.clone());

        for lag in LAGS {
            columns.push(lagged(values, lag, floor));
            columns.push(lagged(&log_values, lag, floor.ln_1p()));
        }
        for w in ROLLING_WINDOWS {
            columns.extend(rolling_columns(values, w)?);
        }
        for lag in LAGS {
            columns.extend(momentum_columns(values, &log_values, lag));
        }
        for w in SPIKE_WINDOWS {
            columns.extend(spike_columns(values, w)?);
        }
        for lag in AUTOCORR_LAGS {
            columns.push(autocorrelation_column(values, lag)?);
        }
        for p in RSI_PERIODS {
            columns.push(rsi_column(values, p)?);
        }
        columns.extend(macd_columns(values)?);
        for w in BAND_WINDOWS {
            columns.extend(band_columns(values, w)?);
        }
        columns.extend(low_value_columns(values, series.low_threshold()));

        for col in &mut columns {
            for v in col.iter_mut() {
                *v = finite_or(*v, 0.0);
            }
        }

        let names = feature_names();
        debug_assert_eq!(names.len(), columns.len());
        Ok(FeatureFrame {
            dates,
            names,
            columns,
        })
    }
}

fn calendar_columns(dates: &[NaiveDate]) -> Vec<Vec<f64>> {
    let mut cols = vec![Vec::with_capacity(dates.len()); 11];
    for date in dates {
        let dow = date.weekday().num_days_from_monday() as f64;
        let month = date.month() as f64;
        let doy = date.ordinal() as f64;
        let row = [
            dow,
            month,
            doy,
            date.iso_week().week() as f64,
            ((date.month() - 1) / 3 + 1) as f64,
            (2.0 * PI * dow / 7.0).sin(),
            (2.0 * PI * dow / 7.0).cos(),
            (2.0 * PI * month / 12.0).sin(),
            (2.0 * PI * month / 12.0).cos(),
            (2.0 * PI * doy / 365.25).sin(),
            (2.0 * PI * doy / 365.25).cos(),
        ];
        for (col, v) in cols.iter_mut().zip(row) {
            col.push(v);
        }
    }
    cols
}

fn lagged(values: &[f64], lag: usize, fill: f64) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= lag { values[i - lag] } else { fill })
        .collect()
}

/// volatility, rolling mean, coefficient of variation and trend slope
fn rolling_columns(values: &[f64], window: usize) -> Result<Vec<Vec<f64>>> {
    let mut std_dev = StandardDeviation::new(window)?;
    let mut slope = RollingSlope::new(window)?;
    let mut cols = vec![Vec::with_capacity(values.len()); 4];

    for &v in values {
        std_dev.update(v)?;
        slope.update(v)?;
        let volatility = std_dev.value().unwrap_or(0.0);
        let mean = std_dev.mean().unwrap_or(v);
        let cv = if std_dev.mean().is_ok() {
            volatility / (mean.abs() + EPSILON)
        } else {
            0.0
        };
        cols[0].push(volatility);
        cols[1].push(mean);
        cols[2].push(cv);
        cols[3].push(slope.value().unwrap_or(0.0));
    }
    Ok(cols)
}

/// relative and log change against the value `lag` days earlier
fn momentum_columns(values: &[f64], log_values: &[f64], lag: usize) -> Vec<Vec<f64>> {
    let relative = (0..values.len())
        .map(|i| {
            if i >= lag {
                (values[i] - values[i - lag]) / (values[i - lag].abs() + EPSILON)
            } else {
                0.0
            }
        })
        .collect();
    let log = (0..values.len())
        .map(|i| {
            if i >= lag {
                log_values[i] - log_values[i - lag]
            } else {
                0.0
            }
        })
        .collect();
    vec![relative, log]
}

fn spike_columns(values: &[f64], window: usize) -> Result<Vec<Vec<f64>>> {
    let mut std_dev = StandardDeviation::new(window)?;
    let mut spikes = Vec::with_capacity(values.len());
    let mut drops = Vec::with_capacity(values.len());

    for &v in values {
        std_dev.update(v)?;
        let (spike, drop) = match (std_dev.mean(), std_dev.value()) {
            (Ok(mean), Ok(sd)) => (v > mean + 2.0 * sd, v < mean - 2.0 * sd),
            _ => (false, false),
        };
        spikes.push(if spike { 1.0 } else { 0.0 });
        drops.push(if drop { 1.0 } else { 0.0 });
    }
    Ok(vec![spikes, drops])
}

fn autocorrelation_column(values: &[f64], lag: usize) -> Result<Vec<f64>> {
    let mut acf = RollingAutocorrelation::new(AUTOCORR_WINDOW, lag)?;
    values
        .iter()
        .map(|&v| {
            acf.update(v)?;
            Ok(acf.value().unwrap_or(0.0))
        })
        .collect()
}

fn rsi_column(values: &[f64], period: usize) -> Result<Vec<f64>> {
    let mut rsi = RelativeStrengthIndex::new(period)?;
    values
        .iter()
        .map(|&v| {
            rsi.update(v)?;
            Ok(rsi.value().unwrap_or(50.0))
        })
        .collect()
}

fn macd_columns(values: &[f64]) -> Result<Vec<Vec<f64>>> {
    let mut macd = Macd::standard()?;
    let mut cols = vec![Vec::with_capacity(values.len()); 3];
    for &v in values {
        macd.update(v)?;
        cols[0].push(macd.macd_value().unwrap_or(0.0));
        cols[1].push(macd.signal_value().unwrap_or(0.0));
        cols[2].push(macd.histogram().unwrap_or(0.0));
    }
    Ok(cols)
}

fn band_columns(values: &[f64], window: usize) -> Result<Vec<Vec<f64>>> {
    let mut bands = BollingerBands::new(window, 2.0)?;
    let mut cols = vec![Vec::with_capacity(values.len()); 3];
    for &v in values {
        bands.update(v)?;
        cols[0].push(bands.upper_band().unwrap_or(v));
        cols[1].push(bands.lower_band().unwrap_or(v));
        cols[2].push(bands.position(v).unwrap_or(0.5));
    }
    Ok(cols)
}

/// low-day indicator and the length of the current run of low days
fn low_value_columns(values: &[f64], threshold: f64) -> Vec<Vec<f64>> {
    let mut indicator = Vec::with_capacity(values.len());
    let mut run_length = Vec::with_capacity(values.len());
    let mut run = 0usize;
    for &v in values {
        if v <= threshold {
            run += 1;
            indicator.push(1.0);
        } else {
            run = 0;
            indicator.push(0.0);
        }
        run_length.push(run as f64);
    }
    vec![indicator, run_length]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesBuilder;
    use approx::assert_relative_eq;

    fn weekly_series(days: usize) -> DailyCaseSeries {
        let counts: Vec<f64> = (0..days)
            .map(|d| match d % 7 {
                5 | 6 => 0.0,
                k => 10.0 + k as f64,
            })
            .collect();
        SeriesBuilder::new(1.0)
            .build_from_counts(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), &counts)
            .unwrap()
    }

    #[test]
    fn column_set_is_fixed() {
        let a = FeatureSynthesizer::new().synthesize(&weekly_series(60)).unwrap();
        let b = FeatureSynthesizer::new().synthesize(&weekly_series(90)).unwrap();
        assert_eq!(a.column_names(), b.column_names());
        assert_eq!(a.column_names(), feature_names().as_slice());
        assert_eq!(a.column_index(TARGET_COLUMN), Some(a.target_index()));
    }

    #[test]
    fn every_cell_is_finite_and_rows_are_dense() {
        let frame = FeatureSynthesizer::new().synthesize(&weekly_series(45)).unwrap();
        assert_eq!(frame.n_rows(), 45);
        for row in frame.rows() {
            assert_eq!(row.len(), frame.n_columns());
            assert!(row.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn lags_are_filled_with_the_floor() {
        let series = weekly_series(40);
        let frame = FeatureSynthesizer::new().synthesize(&series).unwrap();
        let lag7 = frame.column("lag_7").unwrap();
        assert_eq!(lag7[0], 1.0);
        assert_eq!(lag7[10], series.values()[3]);
        let log_lag7 = frame.column("log_lag_7").unwrap();
        assert_relative_eq!(log_lag7[0], 1.0_f64.ln_1p());
    }

    #[test]
    fn neutral_defaults_before_windows_fill() {
        let frame = FeatureSynthesizer::new().synthesize(&weekly_series(40)).unwrap();
        assert_eq!(frame.column("rsi_14").unwrap()[0], 50.0);
        assert_eq!(frame.column("band_position_30").unwrap()[3], 0.5);
        assert_eq!(frame.column("volatility_7").unwrap()[2], 0.0);
        assert_eq!(frame.column("autocorr_7").unwrap()[10], 0.0);
    }

    #[test]
    fn macd_is_zero_until_its_windows_fill() {
        let counts: Vec<f64> = (0..40).map(|d| 5.0 + d as f64).collect();
        let series = SeriesBuilder::new(1.0)
            .with_noise(false)
            .build_from_counts(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), &counts)
            .unwrap();
        let frame = FeatureSynthesizer::new().synthesize(&series).unwrap();
        let macd = frame.column("macd").unwrap();
        let signal = frame.column("macd_signal").unwrap();
        let hist = frame.column("macd_hist").unwrap();

        assert!(macd[..25].iter().all(|&v| v == 0.0));
        assert!(macd[25] > 0.0);
        assert!(signal[..33].iter().all(|&v| v == 0.0));
        assert!(hist[..33].iter().all(|&v| v == 0.0));
        assert!(signal[33] > 0.0);
    }

    #[test]
    fn weekend_lows_are_flagged_and_counted() {
        let frame = FeatureSynthesizer::new().synthesize(&weekly_series(21)).unwrap();
        let is_low = frame.column("is_low").unwrap();
        let run = frame.column("low_run").unwrap();
        assert_eq!(&is_low[4..8], &[0.0, 1.0, 1.0, 0.0]);
        assert_eq!(&run[4..8], &[0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn weekly_pattern_shows_in_autocorrelation() {
        let frame = FeatureSynthesizer::new().synthesize(&weekly_series(90)).unwrap();
        let acf7 = frame.column("autocorr_7").unwrap();
        assert!(acf7[89] > 0.9);
    }

    #[test]
    fn dataframe_has_date_plus_every_column() {
        let frame = FeatureSynthesizer::new().synthesize(&weekly_series(30)).unwrap();
        let df = frame.to_dataframe().unwrap();
        assert_eq!(df.width(), frame.n_columns() + 1);
        assert_eq!(df.height(), 30);
    }
}
