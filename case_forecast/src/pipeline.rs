//! End-to-end forecasting run
//!
//! Builds the daily series, fits the classical and sequence models on the same days,
//! evaluates both over the final `horizon` days and recommends one.

use crate::comparator::{compare, Recommendation};
use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::features::FeatureSynthesizer;
use crate::metrics::{evaluate, evaluate_result, EvaluationReport};
use crate::models::arima::{ClassicalFit, ClassicalFitter};
use crate::models::sequence::{SequenceModel, TrainedSequenceModel};
use crate::models::{ForecastModel, ForecastResult, ModelVariant};
use crate::records::EncounterRecord;
use crate::report::{RunWarning, WarningLog};
use crate::series::{DailyCaseSeries, SeriesBuilder};
use crate::windowing::SequenceWindower;
use tracing::info;

/// What the sequence path produced
#[derive(Debug, Clone)]
pub struct SequenceFit {
    pub model: TrainedSequenceModel,
    /// Window counts per partition
    pub train_windows: usize,
    pub validation_windows: usize,
    /// Metrics of every test window, in window order
    pub test_reports: Vec<EvaluationReport>,
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub series: DailyCaseSeries,
    pub classical: ForecastResult,
    /// `None` when the sequence path was skipped
    pub learned: Option<ForecastResult>,
    pub classical_metrics: EvaluationReport,
    pub learned_metrics: Option<EvaluationReport>,
    pub recommendation: Recommendation,
    pub warnings: Vec<RunWarning>,
    pub classical_fit: ClassicalFit,
    pub sequence_fit: Option<SequenceFit>,
}

/// Runs both model families over one disease series
#[derive(Debug, Clone)]
pub struct ForecastPipeline {
    config: ForecastConfig,
}

impl ForecastPipeline {
    pub fn new(config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Aggregate `records` into a daily series and run on it
    pub fn run(&self, records: &[EncounterRecord]) -> Result<RunReport> {
        let series = SeriesBuilder::from_config(&self.config).build(records)?;
        self.run_series(series)
    }

    pub fn run_series(&self, series: DailyCaseSeries) -> Result<RunReport> {
        let mut log = WarningLog::new();
        if series.dropped_records() > 0 {
            log.record(RunWarning::UnparseableDates {
                dropped: series.dropped_records(),
            });
        }
        if series.low_fraction() > 0.0 {
            log.record(RunWarning::LowValueDays {
                fraction: series.low_fraction(),
                noise_scale: series.noise_scale(),
            });
        }

        let horizon = self.config.horizon_days;
        let floor = self.config.floor_value;
        let (history, holdout) = series.split_holdout(horizon)?;
        let holdout_start = series.date_at(history.len());

        let classical_fit = ClassicalFitter::new(self.config.grid).fit(history, horizon)?;
        if !classical_fit.stationarity.stationary {
            log.record(RunWarning::NonStationary {
                p_value: classical_fit.stationarity.original.p_value,
            });
        }
        if !classical_fit.search.skipped.is_empty() {
            log.record(RunWarning::SkippedCandidates {
                orders: classical_fit.search.skipped.clone(),
            });
        }
        let classical = ForecastResult::new(
            classical_fit.model.name(),
            ModelVariant::Classical,
            holdout_start,
            holdout.to_vec(),
            classical_fit.forecast.clone(),
        )?;
        let classical_metrics = evaluate_result(&classical, floor)?;

        let sequence = self.fit_sequence(&series, &mut log)?;
        let (learned, learned_metrics, sequence_fit, recommendation) = match sequence {
            Some((result, fit)) => {
                let metrics = evaluate_result(&result, floor)?;
                let recommendation = compare(&classical_metrics, &metrics);
                (Some(result), Some(metrics), Some(fit), recommendation)
            }
            None => (None, None, None, Recommendation::classical_only()),
        };

        info!(
            winner = %recommendation.winner,
            classical_wins = recommendation.tally.classical_wins,
            learned_wins = recommendation.tally.learned_wins,
            ties = recommendation.tally.ties,
            "recommendation"
        );

        Ok(RunReport {
            series,
            classical,
            learned,
            classical_metrics,
            learned_metrics,
            recommendation,
            warnings: log.into_inner(),
            classical_fit,
            sequence_fit,
        })
    }

    /// Train on windows and forecast the last test window; `None` when the path is skipped
    fn fit_sequence(
        &self,
        series: &DailyCaseSeries,
        log: &mut WarningLog,
    ) -> Result<Option<(ForecastResult, SequenceFit)>> {
        let frame = FeatureSynthesizer::new().synthesize(series)?;
        let dataset = match SequenceWindower::from_config(&self.config).build(&frame) {
            Ok(dataset) => dataset,
            Err(err @ ForecastError::InsufficientData { .. }) => {
                log.record(RunWarning::SequencePathSkipped {
                    reason: err.to_string(),
                });
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        if let Some(reason) = &dataset.scaler_fallback {
            log.record(RunWarning::ScalerFallback {
                reason: reason.clone(),
            });
        }

        let model = match SequenceModel::from_config(&self.config).train(&dataset) {
            Ok(model) => model,
            Err(err @ ForecastError::Convergence(_)) => {
                log.record(RunWarning::SequencePathSkipped {
                    reason: err.to_string(),
                });
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        if let Some(epoch) = model.history().stopped_early {
            log.record(RunWarning::EarlyStopped { epoch });
        }

        let floor = self.config.floor_value;
        let mut test_reports = Vec::with_capacity(dataset.test.len());
        let mut last = None;
        for window in &dataset.test {
            let predicted = model.forecast(window)?;
            test_reports.push(evaluate(&window.raw_targets, &predicted, floor)?);
            last = Some((window, predicted));
        }
        let Some((window, predicted)) = last else {
            log.record(RunWarning::SequencePathSkipped {
                reason: "no test windows".to_string(),
            });
            return Ok(None);
        };

        let result = ForecastResult::new(
            model.name(),
            ModelVariant::Learned,
            window.target_start,
            window.raw_targets.clone(),
            predicted,
        )?;

        Ok(Some((
            result,
            SequenceFit {
                model,
                train_windows: dataset.train.len(),
                validation_windows: dataset.validation.len(),
                test_reports,
            },
        )))
    }
}

/// Run with default settings apart from the request parameters
pub fn run(
    records: &[EncounterRecord],
    horizon_days: usize,
    lookback_days: usize,
    floor_value: f64,
) -> Result<RunReport> {
    let config = ForecastConfig::default().with_request(horizon_days, lookback_days, floor_value);
    ForecastPipeline::new(config)?.run(records)
}
