//! Metric-by-metric comparison of the two model families

use crate::metrics::EvaluationReport;
use crate::models::ModelVariant;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Metrics that enter the tally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Mse,
    Mae,
    Rmse,
    Mape,
    R2,
    LowValueAccuracy,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Mse,
        Metric::Mae,
        Metric::Rmse,
        Metric::Mape,
        Metric::R2,
        Metric::LowValueAccuracy,
    ];

    pub fn lower_is_better(&self) -> bool {
        matches!(self, Metric::Mse | Metric::Mae | Metric::Rmse | Metric::Mape)
    }

    pub fn value(&self, report: &EvaluationReport) -> Option<f64> {
        match self {
            Metric::Mse => Some(report.mse),
            Metric::Mae => Some(report.mae),
            Metric::Rmse => Some(report.rmse),
            Metric::Mape => Some(report.mape),
            Metric::R2 => Some(report.r2),
            Metric::LowValueAccuracy => report.low_value_accuracy,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Mse => "MSE",
            Metric::Mae => "MAE",
            Metric::Rmse => "RMSE",
            Metric::Mape => "MAPE",
            Metric::R2 => "R2",
            Metric::LowValueAccuracy => "low-value accuracy",
        };
        f.write_str(name)
    }
}

/// Which side came out ahead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Classical,
    Learned,
    Tie,
}

impl Winner {
    /// The recommended variant, `None` on a tie
    pub fn variant(&self) -> Option<ModelVariant> {
        match self {
            Winner::Classical => Some(ModelVariant::Classical),
            Winner::Learned => Some(ModelVariant::Learned),
            Winner::Tie => None,
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Classical => write!(f, "classical"),
            Winner::Learned => write!(f, "learned"),
            Winner::Tie => write!(f, "tie"),
        }
    }
}

/// One metric's values and verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOutcome {
    pub metric: Metric,
    pub classical: Option<f64>,
    pub learned: Option<f64>,
    pub winner: Winner,
}

/// Per-metric verdicts and their counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTally {
    pub classical_wins: usize,
    pub learned_wins: usize,
    pub ties: usize,
    pub outcomes: Vec<MetricOutcome>,
}

impl MetricTally {
    pub fn total(&self) -> usize {
        self.classical_wins + self.learned_wins + self.ties
    }
}

/// Recommended variant with the tally behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub winner: Winner,
    pub tally: MetricTally,
}

impl Recommendation {
    /// Used when only the classical model produced a forecast
    pub fn classical_only() -> Self {
        Self {
            winner: Winner::Classical,
            tally: MetricTally::default(),
        }
    }
}

fn judge(metric: Metric, classical: Option<f64>, learned: Option<f64>) -> Winner {
    match (classical, learned) {
        (None, None) => Winner::Tie,
        (Some(_), None) => Winner::Classical,
        (None, Some(_)) => Winner::Learned,
        (Some(c), Some(l)) => {
            let ordering = c.total_cmp(&l);
            let ordering = if metric.lower_is_better() {
                ordering
            } else {
                ordering.reverse()
            };
            match ordering {
                Ordering::Less => Winner::Classical,
                Ordering::Greater => Winner::Learned,
                Ordering::Equal => Winner::Tie,
            }
        }
    }
}

/// Tally every metric and recommend the side with strictly more wins
pub fn compare(classical: &EvaluationReport, learned: &EvaluationReport) -> Recommendation {
    let mut tally = MetricTally::default();
    for metric in Metric::ALL {
        let c = metric.value(classical);
        let l = metric.value(learned);
        let winner = judge(metric, c, l);
        match winner {
            Winner::Classical => tally.classical_wins += 1,
            Winner::Learned => tally.learned_wins += 1,
            Winner::Tie => tally.ties += 1,
        }
        tally.outcomes.push(MetricOutcome {
            metric,
            classical: c,
            learned: l,
            winner,
        });
    }

    let winner = match tally.classical_wins.cmp(&tally.learned_wins) {
        Ordering::Greater => Winner::Classical,
        Ordering::Less => Winner::Learned,
        Ordering::Equal => Winner::Tie,
    };
    Recommendation { winner, tally }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report(err: f64, r2: f64, low: Option<f64>) -> EvaluationReport {
        EvaluationReport {
            mse: err * err,
            mae: err,
            rmse: err,
            r2,
            mape: err * 10.0,
            low_value_accuracy: low,
            n: 14,
        }
    }

    #[test]
    fn lower_errors_and_higher_r2_win() {
        let rec = compare(&report(1.0, 0.9, Some(80.0)), &report(2.0, 0.5, Some(60.0)));
        assert_eq!(rec.winner, Winner::Classical);
        assert_eq!(rec.tally.classical_wins, 6);
        assert_eq!(rec.tally.total(), 6);
        assert_eq!(rec.winner.variant(), Some(ModelVariant::Classical));
    }

    #[test]
    fn majority_of_metrics_decides() {
        // Learned wins the four error metrics; classical wins R2 and low-value accuracy
        let classical = report(2.0, 0.9, Some(90.0));
        let learned = report(1.0, 0.5, Some(50.0));
        let rec = compare(&classical, &learned);
        assert_eq!(rec.tally.learned_wins, 4);
        assert_eq!(rec.winner, Winner::Learned);

        let even = compare(&report(1.0, 0.5, None), &report(1.0, 0.5, None));
        assert_eq!(even.tally.ties, 6);
        assert_eq!(even.winner, Winner::Tie);
        assert_eq!(even.winner.variant(), None);
    }

    #[test]
    fn three_each_is_reported_as_tie() {
        let classical = EvaluationReport {
            mse: 1.0,
            mae: 1.0,
            rmse: 1.0,
            r2: 0.1,
            mape: 90.0,
            low_value_accuracy: Some(10.0),
            n: 14,
        };
        let learned = EvaluationReport {
            mse: 2.0,
            mae: 2.0,
            rmse: 2.0,
            r2: 0.2,
            mape: 50.0,
            low_value_accuracy: Some(20.0),
            n: 14,
        };
        let rec = compare(&classical, &learned);
        assert_eq!((rec.tally.classical_wins, rec.tally.learned_wins), (3, 3));
        assert_eq!(rec.winner, Winner::Tie);
    }

    #[test]
    fn missing_low_value_accuracy_loses() {
        let rec = compare(&report(1.0, 0.5, None), &report(1.0, 0.5, Some(0.0)));
        let outcome = &rec.tally.outcomes[5];
        assert_eq!(outcome.metric, Metric::LowValueAccuracy);
        assert_eq!(outcome.winner, Winner::Learned);
        assert_eq!(rec.winner, Winner::Learned);
    }

    #[test]
    fn classical_only_has_empty_tally() {
        let rec = Recommendation::classical_only();
        assert_eq!(rec.winner, Winner::Classical);
        assert_eq!(rec.tally.total(), 0);
    }
}
