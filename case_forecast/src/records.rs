//! Encounter records and their ingestion
//!
//! Records arrive from an upstream query layer that has already selected the disease.
//! Only the encounter date matters here; every other column is carried along untouched.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// A single clinical encounter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterRecord {
    date_raw: String,
    fields: BTreeMap<String, String>,
}

impl EncounterRecord {
    /// Create a record from its raw encounter date
    pub fn new(date_raw: impl Into<String>) -> Self {
        Self {
            date_raw: date_raw.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Attach an additional clinical field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// The encounter date as supplied
    pub fn date_raw(&self) -> &str {
        &self.date_raw
    }

    /// The encounter date, if it parses
    pub fn date(&self) -> Option<NaiveDate> {
        parse_date(&self.date_raw)
    }

    /// All non-date fields
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl From<NaiveDate> for EncounterRecord {
    fn from(date: NaiveDate) -> Self {
        Self::new(date.format("%Y-%m-%d").to_string())
    }
}

/// Parse an encounter date in any of the accepted layouts
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Loader for encounter records stored as CSV
#[derive(Debug)]
pub struct RecordLoader;

impl RecordLoader {
    /// Load encounter records from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<EncounterRecord>> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Load encounter records from any CSV source with a header row
    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<EncounterRecord>> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let date_idx = Self::detect_date_column(&headers)?;

        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            let mut record = EncounterRecord::new(row.get(date_idx).unwrap_or_default());
            for (idx, (name, value)) in headers.iter().zip(row.iter()).enumerate() {
                if idx != date_idx {
                    record.fields.insert(name.to_string(), value.to_string());
                }
            }
            records.push(record);
        }

        Ok(records)
    }

    /// Detect the date column by header name
    fn detect_date_column(headers: &csv::StringRecord) -> Result<usize> {
        headers
            .iter()
            .position(|name| {
                let lower = name.to_lowercase();
                lower.contains("date") || lower.contains("time") || lower.contains("timestamp")
            })
            .ok_or_else(|| ForecastError::DataError("No date column found in data".to_string()))
    }
}
