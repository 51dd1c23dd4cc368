//! Run configuration
//!
//! Everything the pipeline can be tuned with lives in [`ForecastConfig`]. Values are
//! injected at call time; nothing here is global state.

use crate::error::{ForecastError, Result};
use crate::scaling::ScalerKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Train/validation/test proportions for the ordered window list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.6,
            validation: 0.2,
            test: 0.2,
        }
    }
}

/// Highest regular differencing order the grid may search
pub const MAX_DIFFERENCING: usize = 2;

/// Inclusive upper bounds of the `(p, d, q)` grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBounds {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
}

impl Default for GridBounds {
    fn default() -> Self {
        Self {
            max_p: 3,
            max_d: 2,
            max_q: 3,
        }
    }
}

/// Recurrent network and training settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Hidden units per direction, one entry per stacked layer
    pub hidden_sizes: Vec<usize>,
    pub dropout: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub huber_delta: f64,
    /// Global gradient-norm ceiling
    pub clip_norm: f64,
    /// Epochs without validation improvement before training stops
    pub early_stop_patience: usize,
    /// Epochs without validation improvement before the learning rate is cut
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub min_learning_rate: f64,
    /// Smallest validation-loss decrease that counts as an improvement
    pub min_delta: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![32, 16],
            dropout: 0.2,
            epochs: 100,
            batch_size: 32,
            learning_rate: 1e-3,
            huber_delta: 1.0,
            clip_norm: 1.0,
            early_stop_patience: 12,
            lr_patience: 5,
            lr_factor: 0.5,
            min_learning_rate: 1e-6,
            min_delta: 1e-5,
        }
    }
}

/// Configuration for one forecasting run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub horizon_days: usize,
    pub lookback_days: usize,
    pub floor_value: f64,
    pub add_noise: bool,
    /// Seed for zero-handling noise, weight initialisation and batch shuffling
    pub seed: u64,
    pub split: SplitRatios,
    pub grid: GridBounds,
    pub scaler: ScalerKind,
    pub network: NetworkConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: 14,
            lookback_days: 30,
            floor_value: 1.0,
            add_noise: true,
            seed: 42,
            split: SplitRatios::default(),
            grid: GridBounds::default(),
            scaler: ScalerKind::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl ForecastConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Override the three per-request knobs
    pub fn with_request(mut self, horizon_days: usize, lookback_days: usize, floor_value: f64) -> Self {
        self.horizon_days = horizon_days;
        self.lookback_days = lookback_days;
        self.floor_value = floor_value;
        self
    }

    /// Check that every option is usable
    pub fn validate(&self) -> Result<()> {
        if self.horizon_days == 0 {
            return Err(ForecastError::Config("horizon_days must be at least 1".to_string()));
        }
        if self.lookback_days == 0 {
            return Err(ForecastError::Config("lookback_days must be at least 1".to_string()));
        }
        if !self.floor_value.is_finite() || self.floor_value <= 0.0 {
            return Err(ForecastError::Config(format!(
                "floor_value must be a positive number, got {}",
                self.floor_value
            )));
        }
        if self.grid.max_d > MAX_DIFFERENCING {
            return Err(ForecastError::Config(format!(
                "grid.max_d must be at most {}, got {}",
                MAX_DIFFERENCING, self.grid.max_d
            )));
        }

        let SplitRatios {
            train,
            validation,
            test,
        } = self.split;
        if [train, validation, test].iter().any(|r| !(*r > 0.0 && *r < 1.0)) {
            return Err(ForecastError::Config(
                "split ratios must each lie strictly between 0 and 1".to_string(),
            ));
        }
        if ((train + validation + test) - 1.0).abs() > 1e-6 {
            return Err(ForecastError::Config(format!(
                "split ratios must sum to 1, got {}",
                train + validation + test
            )));
        }

        let net = &self.network;
        if net.hidden_sizes.is_empty() || net.hidden_sizes.contains(&0) {
            return Err(ForecastError::Config(
                "network.hidden_sizes must list at least one non-zero layer".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&net.dropout) {
            return Err(ForecastError::Config("network.dropout must be in [0, 1)".to_string()));
        }
        if net.epochs == 0 || net.batch_size == 0 {
            return Err(ForecastError::Config(
                "network.epochs and network.batch_size must be at least 1".to_string(),
            ));
        }
        if net.learning_rate <= 0.0 || net.huber_delta <= 0.0 || net.clip_norm <= 0.0 {
            return Err(ForecastError::Config(
                "learning rate, Huber delta and clip norm must be positive".to_string(),
            ));
        }
        if !(net.lr_factor > 0.0 && net.lr_factor < 1.0) {
            return Err(ForecastError::Config("network.lr_factor must be in (0, 1)".to_string()));
        }
        if !(net.min_learning_rate > 0.0 && net.min_learning_rate <= net.learning_rate) {
            return Err(ForecastError::Config(format!(
                "network.min_learning_rate must lie in (0, {}], got {}",
                net.learning_rate, net.min_learning_rate
            )));
        }

        Ok(())
    }
}

/// Identifies which disease a run belongs to; used only to key artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseContext {
    pub name: String,
    pub icd_codes: Vec<String>,
}

impl DiseaseContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icd_codes: Vec::new(),
        }
    }

    pub fn with_icd_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.icd_codes = codes.into_iter().map(Into::into).collect();
        self
    }
}
