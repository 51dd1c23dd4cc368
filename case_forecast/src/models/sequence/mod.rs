//! Recurrent sequence model
//!
//! A stack of bidirectional LSTM layers trained on scaled lookback windows with a Huber
//! loss, Adam and global-norm clipping. Training keeps the weights with the best
//! validation loss, cuts the learning rate when validation stalls and stops early when
//! it stalls for longer.

pub mod lstm;
pub mod network;
pub mod optimizer;

use crate::config::{ForecastConfig, NetworkConfig};
use crate::error::{ForecastError, Result};
use crate::models::ForecastModel;
use crate::scaling::FeatureScaler;
use crate::windowing::{SequenceWindow, WindowedDataset};
use network::SequenceNetwork;
use optimizer::{clip_global_norm, Adam};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Mean Huber loss over paired values
pub fn huber_loss(predicted: &[f64], target: &[f64], delta: f64) -> f64 {
    if predicted.is_empty() {
        return 0.0;
    }
    let total: f64 = predicted
        .iter()
        .zip(target)
        .map(|(p, t)| {
            let r = (p - t).abs();
            if r <= delta {
                0.5 * r * r
            } else {
                delta * (r - 0.5 * delta)
            }
        })
        .sum();
    total / predicted.len() as f64
}

/// Derivative of the summed Huber loss with respect to each prediction
pub fn huber_gradient(predicted: &[f64], target: &[f64], delta: f64) -> Vec<f64> {
    predicted
        .iter()
        .zip(target)
        .map(|(p, t)| (p - t).clamp(-delta, delta))
        .collect()
}

/// Per-epoch record of a training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub validation_loss: Vec<f64>,
    pub learning_rate: Vec<f64>,
    /// Epoch whose weights were kept (zero-based)
    pub best_epoch: usize,
    /// Epoch at which patience ran out, if it did
    pub stopped_early: Option<usize>,
}

impl TrainingHistory {
    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    pub fn best_validation_loss(&self) -> Option<f64> {
        self.validation_loss.get(self.best_epoch).copied()
    }
}

/// Stacked bidirectional LSTM forecaster
#[derive(Debug, Clone)]
pub struct SequenceModel {
    name: String,
    config: NetworkConfig,
    seed: u64,
    floor: f64,
}

impl SequenceModel {
    pub fn new(config: NetworkConfig, seed: u64, floor: f64) -> Self {
        let layers: Vec<String> = config.hidden_sizes.iter().map(|h| h.to_string()).collect();
        Self {
            name: format!("BiLSTM({})", layers.join("-")),
            config,
            seed,
            floor,
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.network.clone(), config.seed, config.floor_value)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn mean_loss(&self, network: &SequenceNetwork, windows: &[SequenceWindow]) -> f64 {
        if windows.is_empty() {
            return f64::NAN;
        }
        windows
            .iter()
            .map(|w| huber_loss(&network.predict(&w.inputs), &w.targets, self.config.huber_delta))
            .sum::<f64>()
            / windows.len() as f64
    }
}

impl ForecastModel for SequenceModel {
    type Input = WindowedDataset;
    type Trained = TrainedSequenceModel;

    fn train(&self, data: &WindowedDataset) -> Result<TrainedSequenceModel> {
        if data.train.is_empty() || data.validation.is_empty() {
            return Err(ForecastError::DataError(format!(
                "{} needs training and validation windows, got {} and {}",
                self.name,
                data.train.len(),
                data.validation.len()
            )));
        }

        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut network = SequenceNetwork::new(
            data.n_features,
            &cfg.hidden_sizes,
            data.horizon,
            cfg.dropout,
            &mut rng,
        );
        let mut adam = Adam::new(cfg.learning_rate);
        let mut history = TrainingHistory::default();

        let mut best_network = network.clone();
        let mut best_loss = f64::INFINITY;
        let mut stale_epochs = 0;
        let mut stale_since_cut = 0;
        let mut order: Vec<usize> = (0..data.train.len()).collect();

        for epoch in 0..cfg.epochs {
            // Shuffling never crosses into validation or test windows
            order.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            for batch in order.chunks(cfg.batch_size) {
                network.zero_grad();
                let scale = 1.0 / (batch.len() * data.horizon) as f64;
                for &idx in batch {
                    let window = &data.train[idx];
                    let trace = network.forward_train(&window.inputs, &mut rng);
                    epoch_loss += huber_loss(&trace.output, &window.targets, cfg.huber_delta);
                    let d_output: Vec<f64> =
                        huber_gradient(&trace.output, &window.targets, cfg.huber_delta)
                            .into_iter()
                            .map(|g| g * scale)
                            .collect();
                    network.backward(&trace, &d_output);
                }

                let mut params = network.params_mut();
                clip_global_norm(&mut params, cfg.clip_norm);
                adam.step(&mut params);
            }

            let train_loss = epoch_loss / data.train.len() as f64;
            let validation_loss = self.mean_loss(&network, &data.validation);
            if !validation_loss.is_finite() {
                return Err(ForecastError::Convergence(format!(
                    "{} validation loss diverged at epoch {}",
                    self.name, epoch
                )));
            }
            history.train_loss.push(train_loss);
            history.validation_loss.push(validation_loss);
            history.learning_rate.push(adam.learning_rate());
            debug!(epoch, train_loss, validation_loss, lr = adam.learning_rate(), "epoch finished");

            if validation_loss < best_loss - cfg.min_delta {
                best_loss = validation_loss;
                best_network = network.clone();
                history.best_epoch = epoch;
                stale_epochs = 0;
                stale_since_cut = 0;
                continue;
            }

            stale_epochs += 1;
            stale_since_cut += 1;
            if stale_since_cut >= cfg.lr_patience {
                let reduced = (adam.learning_rate() * cfg.lr_factor).max(cfg.min_learning_rate);
                if reduced < adam.learning_rate() {
                    debug!(epoch, lr = reduced, "reducing learning rate");
                    adam.set_learning_rate(reduced);
                }
                stale_since_cut = 0;
            }
            if stale_epochs >= cfg.early_stop_patience {
                history.stopped_early = Some(epoch);
                break;
            }
        }

        info!(
            model = %self.name,
            epochs = history.epochs(),
            best_epoch = history.best_epoch,
            best_validation_loss = best_loss,
            "sequence model trained"
        );

        Ok(TrainedSequenceModel {
            name: self.name.clone(),
            network: best_network,
            scaler: data.scaler.clone(),
            target_index: data.target_index,
            lookback: data.lookback,
            horizon: data.horizon,
            floor: self.floor,
            history,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Trained sequence model with the scaler it was trained under
#[derive(Debug, Clone)]
pub struct TrainedSequenceModel {
    name: String,
    network: SequenceNetwork,
    scaler: FeatureScaler,
    target_index: usize,
    lookback: usize,
    horizon: usize,
    floor: f64,
    history: TrainingHistory,
}

impl TrainedSequenceModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &SequenceNetwork {
        &self.network
    }

    pub fn scaler(&self) -> &FeatureScaler {
        &self.scaler
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Network output for a window, still in scaled units
    pub fn forecast_scaled(&self, window: &SequenceWindow) -> Result<Vec<f64>> {
        if window.inputs.len() != self.lookback {
            return Err(ForecastError::ValidationError(format!(
                "window has {} rows, model expects {}",
                window.inputs.len(),
                self.lookback
            )));
        }
        let width = self.network.n_features();
        if let Some(row) = window.inputs.iter().find(|row| row.len() != width) {
            return Err(ForecastError::ValidationError(format!(
                "window row has {} features, model expects {}",
                row.len(),
                width
            )));
        }
        Ok(self.network.predict(&window.inputs))
    }

    /// Case counts for the `horizon` days after the window, never below the floor
    pub fn forecast(&self, window: &SequenceWindow) -> Result<Vec<f64>> {
        Ok(self
            .forecast_scaled(window)?
            .into_iter()
            .map(|v| {
                let value = self.scaler.inverse_value(self.target_index, v);
                if value.is_finite() {
                    value.max(self.floor)
                } else {
                    self.floor
                }
            })
            .collect())
    }
}
