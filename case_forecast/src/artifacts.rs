//! Serializable outputs of a run, keyed by disease and run time
//!
//! Storage is left to the caller; these types only fix what gets handed over.

use crate::config::DiseaseContext;
use crate::error::Result;
use crate::metrics::EvaluationReport;
use crate::models::arima::{ModelOrder, TrainedArimaModel};
use crate::models::sequence::network::SequenceNetwork;
use crate::models::sequence::{TrainedSequenceModel, TrainingHistory};
use crate::pipeline::RunReport;
use crate::report::RunWarning;
use crate::scaling::FeatureScaler;
use crate::stationarity::Differencing;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fitted classical model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicalArtifact {
    pub order: ModelOrder,
    pub transform: Differencing,
    pub intercept: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub aic: f64,
}

impl From<&TrainedArimaModel> for ClassicalArtifact {
    fn from(model: &TrainedArimaModel) -> Self {
        Self {
            order: model.order(),
            transform: model.transform(),
            intercept: model.intercept(),
            ar: model.ar_coefficients().to_vec(),
            ma: model.ma_coefficients().to_vec(),
            aic: model.aic(),
        }
    }
}

/// Fitted sequence model with the scaler needed to read its output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceArtifact {
    pub name: String,
    pub network: SequenceNetwork,
    pub scaler: FeatureScaler,
    pub history: TrainingHistory,
}

impl From<&TrainedSequenceModel> for SequenceArtifact {
    fn from(model: &TrainedSequenceModel) -> Self {
        Self {
            name: model.name().to_string(),
            network: model.network().clone(),
            scaler: model.scaler().clone(),
            history: model.history().clone(),
        }
    }
}

/// Everything a run hands to the artifact store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub disease: DiseaseContext,
    pub run_at: DateTime<Utc>,
    pub classical: ClassicalArtifact,
    pub sequence: Option<SequenceArtifact>,
    pub classical_metrics: EvaluationReport,
    pub learned_metrics: Option<EvaluationReport>,
    pub warnings: Vec<RunWarning>,
}

impl RunArtifacts {
    pub fn from_report(report: &RunReport, disease: DiseaseContext, run_at: DateTime<Utc>) -> Self {
        Self {
            disease,
            run_at,
            classical: ClassicalArtifact::from(&report.classical_fit.model),
            sequence: report
                .sequence_fit
                .as_ref()
                .map(|fit| SequenceArtifact::from(&fit.model)),
            classical_metrics: report.classical_metrics.clone(),
            learned_metrics: report.learned_metrics.clone(),
            warnings: report.warnings.clone(),
        }
    }

    /// Storage key: disease name and run time
    pub fn key(&self) -> String {
        format!("{}/{}", self.disease.name, self.run_at.format("%Y%m%dT%H%M%SZ"))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
