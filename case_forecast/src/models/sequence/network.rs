//! Stacked bidirectional LSTM with a dense multi-step head

use super::lstm::{matvec, matvec_t_add, outer_add, BiLstmLayer, BiLstmTrace, Param};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fully connected output layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    input_size: usize,
    output_size: usize,
    w: Param,
    b: Param,
}

impl Dense {
    pub fn new<R: Rng>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        Self {
            input_size,
            output_size,
            w: Param::glorot(output_size, input_size, rng),
            b: Param::zeros(output_size),
        }
    }

    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        matvec(&self.w.value, self.output_size, self.input_size, x)
            .into_iter()
            .zip(&self.b.value)
            .map(|(y, b)| y + b)
            .collect()
    }

    pub fn backward(&mut self, x: &[f64], dy: &[f64]) -> Vec<f64> {
        outer_add(&mut self.w.grad, self.input_size, dy, x);
        for (g, d) in self.b.grad.iter_mut().zip(dy) {
            *g += d;
        }
        let mut dx = vec![0.0; self.input_size];
        matvec_t_add(&self.w.value, self.output_size, self.input_size, dy, &mut dx);
        dx
    }

    pub fn params_mut(&mut self) -> [&mut Param; 2] {
        [&mut self.w, &mut self.b]
    }
}

/// Everything a training step needs to backpropagate one window
#[derive(Debug, Clone)]
pub struct NetworkTrace {
    layers: Vec<BiLstmTrace>,
    /// Inverted-dropout masks applied to each layer's outputs
    masks: Vec<Option<Vec<Vec<f64>>>>,
    summary: Vec<f64>,
    pub output: Vec<f64>,
}

/// Bidirectional LSTM layers of decreasing width feeding a dense head
///
/// Every layer returns its full sequence; the head reads the forward state at the last
/// step and the backward state at the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceNetwork {
    layers: Vec<BiLstmLayer>,
    head: Dense,
    dropout: f64,
}

impl SequenceNetwork {
    pub fn new<R: Rng>(
        n_features: usize,
        hidden_sizes: &[usize],
        horizon: usize,
        dropout: f64,
        rng: &mut R,
    ) -> Self {
        let mut layers = Vec::with_capacity(hidden_sizes.len());
        let mut input_size = n_features;
        for &hidden in hidden_sizes {
            let layer = BiLstmLayer::new(input_size, hidden, rng);
            input_size = layer.output_size();
            layers.push(layer);
        }

        Self {
            layers,
            head: Dense::new(input_size, horizon, rng),
            dropout,
        }
    }

    pub fn horizon(&self) -> usize {
        self.head.output_size
    }

    pub fn n_features(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_size())
    }

    /// Inference pass, no dropout
    pub fn predict(&self, inputs: &[Vec<f64>]) -> Vec<f64> {
        self.run(inputs, None::<&mut rand::rngs::StdRng>).output
    }

    /// Training pass; dropout masks are drawn from `rng`
    pub fn forward_train<R: Rng>(&self, inputs: &[Vec<f64>], rng: &mut R) -> NetworkTrace {
        self.run(inputs, Some(rng))
    }

    fn run<R: Rng>(&self, inputs: &[Vec<f64>], mut rng: Option<&mut R>) -> NetworkTrace {
        let keep = 1.0 - self.dropout;
        let mut traces = Vec::with_capacity(self.layers.len());
        let mut masks = Vec::with_capacity(self.layers.len());
        let mut current = inputs.to_vec();

        for layer in &self.layers {
            let trace = layer.forward(&current);
            let mut outputs = trace.outputs.clone();
            let mask = match rng.as_deref_mut() {
                Some(rng) if self.dropout > 0.0 => {
                    let mask: Vec<Vec<f64>> = outputs
                        .iter()
                        .map(|row| {
                            row.iter()
                                .map(|_| if rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 })
                                .collect()
                        })
                        .collect();
                    for (row, m) in outputs.iter_mut().zip(&mask) {
                        for (v, k) in row.iter_mut().zip(m) {
                            *v *= k;
                        }
                    }
                    Some(mask)
                }
                _ => None,
            };
            traces.push(trace);
            masks.push(mask);
            current = outputs;
        }

        let summary = self.summarize(&current);
        let output = self.head.forward(&summary);
        NetworkTrace {
            layers: traces,
            masks,
            summary,
            output,
        }
    }

    fn summarize(&self, outputs: &[Vec<f64>]) -> Vec<f64> {
        let (Some(first), Some(last)) = (outputs.first(), outputs.last()) else {
            return vec![0.0; self.head.input_size];
        };
        let h = last.len() / 2;
        let mut summary = last[..h].to_vec();
        summary.extend_from_slice(&first[h..]);
        summary
    }

    /// Accumulate gradients for one window given `d_output = dLoss/dOutput`
    pub fn backward(&mut self, trace: &NetworkTrace, d_output: &[f64]) {
        let d_summary = self.head.backward(&trace.summary, d_output);

        let steps = trace.layers.last().map_or(0, |t| t.outputs.len());
        if steps == 0 {
            return;
        }
        let width = d_summary.len();
        let h = width / 2;
        let mut d_current = vec![vec![0.0; width]; steps];
        d_current[steps - 1][..h].copy_from_slice(&d_summary[..h]);
        for k in h..width {
            d_current[0][k] += d_summary[k];
        }

        for (idx, layer) in self.layers.iter_mut().enumerate().rev() {
            if let Some(mask) = &trace.masks[idx] {
                for (row, m) in d_current.iter_mut().zip(mask) {
                    for (d, k) in row.iter_mut().zip(m) {
                        *d *= k;
                    }
                }
            }
            d_current = layer.backward(&trace.layers[idx], &d_current);
        }
    }

    /// Every trainable parameter, always in the same order
    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = Vec::new();
        for layer in &mut self.layers {
            params.extend(layer.params_mut());
        }
        params.extend(self.head.params_mut());
        params
    }

    pub fn zero_grad(&mut self) {
        for param in self.params_mut() {
            param.zero_grad();
        }
    }
}
