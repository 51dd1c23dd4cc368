//! Dense daily case series
//!
//! [`SeriesBuilder`] turns encounter records into one count per calendar day and applies
//! the low-value policy: every day at or below the floor `m` becomes `m + U[0, k]`, where
//! the noise ceiling `k` depends on how much of the series sits at the floor.

use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::records::EncounterRecord;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Noise ceiling chosen from the fraction of low days
pub fn noise_scale(low_fraction: f64) -> f64 {
    if low_fraction > 0.5 {
        0.1
    } else if low_fraction > 0.2 {
        0.2
    } else {
        0.05
    }
}

/// Gap-free daily counts over `[start, end]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesParts")]
pub struct DailyCaseSeries {
    start: NaiveDate,
    values: Vec<f64>,
    raw_counts: Vec<f64>,
    floor: f64,
    noise_scale: f64,
    low_fraction: f64,
    dropped_records: usize,
}

/// Serialized form, checked before it becomes a [`DailyCaseSeries`]
#[derive(Deserialize)]
struct SeriesParts {
    start: NaiveDate,
    values: Vec<f64>,
    raw_counts: Vec<f64>,
    floor: f64,
    noise_scale: f64,
    low_fraction: f64,
    dropped_records: usize,
}

impl TryFrom<SeriesParts> for DailyCaseSeries {
    type Error = ForecastError;

    fn try_from(parts: SeriesParts) -> Result<Self> {
        if parts.values.is_empty() {
            return Err(ForecastError::DataError("series has no days".to_string()));
        }
        if parts.values.len() != parts.raw_counts.len() {
            return Err(ForecastError::DataError(format!(
                "series has {} values but {} raw counts",
                parts.values.len(),
                parts.raw_counts.len()
            )));
        }
        if parts.values.iter().chain(&parts.raw_counts).any(|v| !v.is_finite()) {
            return Err(ForecastError::DataError(
                "series contains non-finite counts".to_string(),
            ));
        }
        Ok(Self {
            start: parts.start,
            values: parts.values,
            raw_counts: parts.raw_counts,
            floor: parts.floor,
            noise_scale: parts.noise_scale,
            low_fraction: parts.low_fraction,
            dropped_records: parts.dropped_records,
        })
    }
}

impl DailyCaseSeries {
    /// First day of the series
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the series
    pub fn end(&self) -> NaiveDate {
        self.date_at(self.values.len().saturating_sub(1))
    }

    /// Calendar date of the `index`-th day
    pub fn date_at(&self, index: usize) -> NaiveDate {
        self.start + Duration::days(index as i64)
    }

    /// Every date, in order
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.values.len()).map(move |i| self.date_at(i))
    }

    /// Counts after the low-value policy
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Counts before the low-value policy
    pub fn raw_counts(&self) -> &[f64] {
        &self.raw_counts
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Upper bound of the noise added to low days
    pub fn noise_scale(&self) -> f64 {
        self.noise_scale
    }

    /// Fraction of days whose raw count was at or below the floor
    pub fn low_fraction(&self) -> f64 {
        self.low_fraction
    }

    /// Highest value a day touched by the low-value policy can hold
    pub fn low_threshold(&self) -> f64 {
        self.floor + self.noise_scale
    }

    /// Records discarded because their date did not parse
    pub fn dropped_records(&self) -> usize {
        self.dropped_records
    }

    /// Split into history and the final `holdout` days
    pub fn split_holdout(&self, holdout: usize) -> Result<(&[f64], &[f64])> {
        if holdout == 0 || holdout >= self.values.len() {
            return Err(ForecastError::InsufficientData {
                needed: holdout + 1,
                got: self.values.len(),
            });
        }
        Ok(self.values.split_at(self.values.len() - holdout))
    }

    /// Label each day with the first period whose inclusive range contains it
    pub fn tag_periods(&self, periods: &[Period]) -> Vec<Option<String>> {
        self.dates()
            .map(|date| {
                periods
                    .iter()
                    .find(|p| p.contains(date))
                    .map(|p| p.label.clone())
            })
            .collect()
    }
}

/// A named, inclusive date range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(label: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Builds a [`DailyCaseSeries`] from encounter records
#[derive(Debug, Clone)]
pub struct SeriesBuilder {
    floor: f64,
    add_noise: bool,
    seed: u64,
}

impl SeriesBuilder {
    /// Create a builder with the given floor, noise enabled and seed 42
    pub fn new(floor: f64) -> Self {
        Self {
            floor,
            add_noise: true,
            seed: 42,
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            floor: config.floor_value,
            add_noise: config.add_noise,
            seed: config.seed,
        }
    }

    pub fn with_noise(mut self, add_noise: bool) -> Self {
        self.add_noise = add_noise;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Count records per calendar day and fill every gap in the date span
    pub fn build(&self, records: &[EncounterRecord]) -> Result<DailyCaseSeries> {
        let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        let mut dropped = 0;
        for record in records {
            match record.date() {
                Some(date) => *per_day.entry(date).or_insert(0) += 1,
                None => dropped += 1,
            }
        }

        let (start, end) = match (per_day.keys().next(), per_day.keys().next_back()) {
            (Some(&start), Some(&end)) => (start, end),
            _ => {
                return Err(ForecastError::DataError(format!(
                    "No parseable encounter dates among {} records",
                    records.len()
                )))
            }
        };

        let span = (end - start).num_days() as usize + 1;
        let counts: Vec<f64> = (0..span)
            .map(|i| {
                let date = start + Duration::days(i as i64);
                per_day.get(&date).copied().unwrap_or(0) as f64
            })
            .collect();

        info!(
            records = records.len(),
            dropped,
            start = %start,
            end = %end,
            days = span,
            "aggregated encounter records"
        );

        let mut series = self.build_from_counts(start, &counts)?;
        series.dropped_records = dropped;
        Ok(series)
    }

    /// Apply the low-value policy to already dense daily counts starting at `start`
    pub fn build_from_counts(&self, start: NaiveDate, counts: &[f64]) -> Result<DailyCaseSeries> {
        if counts.is_empty() {
            return Err(ForecastError::DataError("Empty case series".to_string()));
        }
        if let Some(bad) = counts.iter().find(|c| !c.is_finite() || **c < 0.0) {
            return Err(ForecastError::DataError(format!(
                "Daily counts must be finite and non-negative, found {}",
                bad
            )));
        }

        let low_days = counts.iter().filter(|&&c| c <= self.floor).count();
        let low_fraction = low_days as f64 / counts.len() as f64;
        let scale = noise_scale(low_fraction);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Uniform::new_inclusive(0.0, scale);
        let values = counts
            .iter()
            .map(|&c| {
                if c > self.floor {
                    c
                } else if self.add_noise {
                    self.floor + noise.sample(&mut rng)
                } else {
                    self.floor
                }
            })
            .collect();

        debug!(
            low_days,
            low_fraction,
            noise_scale = scale,
            "applied low-value policy"
        );

        Ok(DailyCaseSeries {
            start,
            values,
            raw_counts: counts.to_vec(),
            floor: self.floor,
            noise_scale: scale,
            low_fraction,
            dropped_records: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn gaps_are_filled_and_span_is_exact() {
        let records: Vec<EncounterRecord> = vec![
            day(2024, 1, 10).into(),
            day(2024, 1, 1).into(),
            day(2024, 1, 1).into(),
            EncounterRecord::new("garbage"),
            day(2024, 1, 5).into(),
        ];
        let series = SeriesBuilder::new(1.0).with_noise(false).build(&records).unwrap();

        assert_eq!(series.len(), 10);
        assert_eq!(series.start(), day(2024, 1, 1));
        assert_eq!(series.end(), day(2024, 1, 10));
        assert_eq!(series.dropped_records(), 1);
        assert_eq!(series.raw_counts()[0], 2.0);
        assert_eq!(series.raw_counts()[4], 1.0);
        assert_eq!(series.raw_counts()[1], 0.0);
    }

    #[test]
    fn no_parseable_dates_is_a_data_error() {
        let records = vec![EncounterRecord::new("n/a"), EncounterRecord::new("")];
        let err = SeriesBuilder::new(1.0).build(&records).unwrap_err();
        assert!(matches!(err, ForecastError::DataError(_)));
    }

    #[test]
    fn noise_scale_tiers() {
        assert_eq!(noise_scale(0.8), 0.1);
        assert_eq!(noise_scale(0.5), 0.2);
        assert_eq!(noise_scale(0.21), 0.2);
        assert_eq!(noise_scale(0.2), 0.05);
        assert_eq!(noise_scale(0.0), 0.05);
    }

    #[test]
    fn same_seed_same_noise() {
        let counts = [0.0, 5.0, 0.0, 1.0, 7.0, 0.0];
        let a = SeriesBuilder::new(1.0).with_seed(7).build_from_counts(day(2024, 1, 1), &counts);
        let b = SeriesBuilder::new(1.0).with_seed(7).build_from_counts(day(2024, 1, 1), &counts);
        assert_eq!(a.unwrap().values(), b.unwrap().values());
    }

    #[test]
    fn periods_tag_by_date_range() {
        let series = SeriesBuilder::new(1.0)
            .build_from_counts(day(2024, 1, 1), &[3.0; 6])
            .unwrap();
        let tags = series.tag_periods(&[
            Period::new("before", day(2024, 1, 1), day(2024, 1, 2)),
            Period::new("after", day(2024, 1, 4), day(2024, 1, 9)),
        ]);
        assert_eq!(
            tags,
            vec![
                Some("before".to_string()),
                Some("before".to_string()),
                None,
                Some("after".to_string()),
                Some("after".to_string()),
                Some("after".to_string()),
            ]
        );
    }

    #[test]
    fn holdout_split_keeps_the_tail() {
        let series = SeriesBuilder::new(0.0)
            .build_from_counts(day(2024, 1, 1), &[1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        let (history, holdout) = series.split_holdout(2).unwrap();
        assert_eq!(history, &[1.0, 2.0, 3.0]);
        assert_eq!(holdout, &[4.0, 5.0]);
        assert!(series.split_holdout(5).is_err());
    }

    #[test]
    fn deserializing_checks_the_days() {
        let series = SeriesBuilder::new(1.0)
            .with_noise(false)
            .build_from_counts(day(2024, 1, 1), &[2.0, 0.0, 4.0])
            .unwrap();
        let json = serde_json::to_string(&series).unwrap();
        let restored: DailyCaseSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, series);
        assert_eq!(restored.end(), day(2024, 1, 3));

        let empty = r#"{"start":"2024-01-01","values":[],"raw_counts":[],"floor":1.0,
            "noise_scale":0.05,"low_fraction":0.0,"dropped_records":0}"#;
        assert!(serde_json::from_str::<DailyCaseSeries>(empty).is_err());

        let ragged = r#"{"start":"2024-01-01","values":[1.0,2.0],"raw_counts":[1.0],
            "floor":1.0,"noise_scale":0.05,"low_fraction":0.0,"dropped_records":0}"#;
        assert!(serde_json::from_str::<DailyCaseSeries>(ragged).is_err());
    }
}
