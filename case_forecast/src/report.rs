//! Structured warnings surfaced by a run

use crate::models::arima::ModelOrder;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A recovered, non-fatal condition worth auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    /// Records whose date could not be parsed were dropped
    UnparseableDates { dropped: usize },
    /// Share of days at or below the floor, and the noise ceiling chosen for them
    LowValueDays { fraction: f64, noise_scale: f64 },
    /// No differencing made the history stationary
    NonStationary { p_value: f64 },
    /// Grid candidates that failed to fit
    SkippedCandidates { orders: Vec<ModelOrder> },
    /// The configured scaler failed and standard normalisation was used
    ScalerFallback { reason: String },
    /// The sequence model was not run
    SequencePathSkipped { reason: String },
    /// Training stopped before the configured number of epochs
    EarlyStopped { epoch: usize },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::UnparseableDates { dropped } => {
                write!(f, "dropped {} records with unparseable dates", dropped)
            }
            RunWarning::LowValueDays {
                fraction,
                noise_scale,
            } => write!(
                f,
                "{:.1}% of days at or below the floor, noise ceiling {}",
                fraction * 100.0,
                noise_scale
            ),
            RunWarning::NonStationary { p_value } => write!(
                f,
                "history is not stationary under any differencing (ADF p = {:.4})",
                p_value
            ),
            RunWarning::SkippedCandidates { orders } => {
                let orders: Vec<String> = orders.iter().map(ToString::to_string).collect();
                write!(f, "skipped {} grid candidates: {}", orders.len(), orders.join(" "))
            }
            RunWarning::ScalerFallback { reason } => {
                write!(f, "fell back to standard scaling: {}", reason)
            }
            RunWarning::SequencePathSkipped { reason } => {
                write!(f, "sequence model skipped: {}", reason)
            }
            RunWarning::EarlyStopped { epoch } => write!(f, "training stopped early at epoch {}", epoch),
        }
    }
}

/// Warnings collected over a run, each logged as it is recorded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarningLog {
    warnings: Vec<RunWarning>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, warning: RunWarning) {
        warn!(%warning, "run warning");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[RunWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_inner(self) -> Vec<RunWarning> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn warnings_serialize_with_kind_tag() {
        let warning = RunWarning::UnparseableDates { dropped: 3 };
        let json = serde_json::to_string(&warning).unwrap();
        assert_eq!(json, r#"{"kind":"unparseable_dates","dropped":3}"#);
    }

    #[test]
    fn log_keeps_order() {
        let mut log = WarningLog::new();
        log.record(RunWarning::EarlyStopped { epoch: 7 });
        log.record(RunWarning::SkippedCandidates {
            orders: vec![ModelOrder::new(3, 2, 3)],
        });
        assert_eq!(log.warnings().len(), 2);
        assert_eq!(log.warnings()[0], RunWarning::EarlyStopped { epoch: 7 });
        assert_eq!(
            log.warnings()[1].to_string(),
            "skipped 1 grid candidates: (3,2,3)"
        );
    }
}
