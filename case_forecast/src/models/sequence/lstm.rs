//! LSTM cells and the bidirectional layer built from them

use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Trainable weights with their accumulated gradient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub value: Vec<f64>,
    #[serde(skip)]
    pub grad: Vec<f64>,
}

// Gradients are scratch space; two params are equal when their weights are
impl PartialEq for Param {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Param {
    pub fn zeros(len: usize) -> Self {
        Self {
            value: vec![0.0; len],
            grad: vec![0.0; len],
        }
    }

    /// Glorot-uniform initialisation of a `fan_out x fan_in` matrix
    pub fn glorot<R: Rng>(fan_out: usize, fan_in: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        Self {
            value: (0..fan_out * fan_in).map(|_| dist.sample(rng)).collect(),
            grad: vec![0.0; fan_out * fan_in],
        }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn zero_grad(&mut self) {
        // Deserialised params arrive with no gradient buffer
        if self.grad.len() != self.value.len() {
            self.grad = vec![0.0; self.value.len()];
        } else {
            self.grad.iter_mut().for_each(|g| *g = 0.0);
        }
    }
}

/// `w (rows x cols) * x`
pub(crate) fn matvec(w: &[f64], rows: usize, cols: usize, x: &[f64]) -> Vec<f64> {
    (0..rows)
        .map(|r| {
            w[r * cols..(r + 1) * cols]
                .iter()
                .zip(x)
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

/// `out += w^T * dy`
pub(crate) fn matvec_t_add(w: &[f64], rows: usize, cols: usize, dy: &[f64], out: &mut [f64]) {
    for r in 0..rows {
        let d = dy[r];
        if d == 0.0 {
            continue;
        }
        for (o, a) in out.iter_mut().zip(&w[r * cols..(r + 1) * cols]) {
            *o += a * d;
        }
    }
}

/// `grad += dy * x^T`
pub(crate) fn outer_add(grad: &mut [f64], cols: usize, dy: &[f64], x: &[f64]) {
    for (r, d) in dy.iter().enumerate() {
        if *d == 0.0 {
            continue;
        }
        for (g, xv) in grad[r * cols..(r + 1) * cols].iter_mut().zip(x) {
            *g += d * xv;
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Activations of one time step, kept for backpropagation
#[derive(Debug, Clone)]
struct StepCache {
    x: Vec<f64>,
    h_prev: Vec<f64>,
    c_prev: Vec<f64>,
    i: Vec<f64>,
    f: Vec<f64>,
    g: Vec<f64>,
    o: Vec<f64>,
    tanh_c: Vec<f64>,
}

/// Forward pass of a cell over a whole sequence
#[derive(Debug, Clone)]
pub struct LstmTrace {
    steps: Vec<StepCache>,
    pub outputs: Vec<Vec<f64>>,
}

/// Single-direction LSTM with gates stacked as input, forget, cell, output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmCell {
    input_size: usize,
    hidden_size: usize,
    w: Param,
    u: Param,
    b: Param,
}

impl LstmCell {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let gates = 4 * hidden_size;
        let mut b = Param::zeros(gates);
        // Forget gate starts open
        b.value[hidden_size..2 * hidden_size]
            .iter_mut()
            .for_each(|v| *v = 1.0);

        Self {
            input_size,
            hidden_size,
            w: Param::glorot(gates, input_size, rng),
            u: Param::glorot(gates, hidden_size, rng),
            b,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn forward(&self, xs: &[Vec<f64>]) -> LstmTrace {
        let h = self.hidden_size;
        let mut h_prev = vec![0.0; h];
        let mut c_prev = vec![0.0; h];
        let mut steps = Vec::with_capacity(xs.len());
        let mut outputs = Vec::with_capacity(xs.len());

        for x in xs {
            let mut z = matvec(&self.w.value, 4 * h, self.input_size, x);
            let recurrent = matvec(&self.u.value, 4 * h, h, &h_prev);
            for ((zv, r), b) in z.iter_mut().zip(&recurrent).zip(&self.b.value) {
                *zv += r + b;
            }

            let i: Vec<f64> = z[..h].iter().map(|&v| sigmoid(v)).collect();
            let f: Vec<f64> = z[h..2 * h].iter().map(|&v| sigmoid(v)).collect();
            let g: Vec<f64> = z[2 * h..3 * h].iter().map(|v| v.tanh()).collect();
            let o: Vec<f64> = z[3 * h..].iter().map(|&v| sigmoid(v)).collect();

            let c: Vec<f64> = (0..h).map(|k| f[k] * c_prev[k] + i[k] * g[k]).collect();
            let tanh_c: Vec<f64> = c.iter().map(|v| v.tanh()).collect();
            let h_next: Vec<f64> = (0..h).map(|k| o[k] * tanh_c[k]).collect();

            steps.push(StepCache {
                x: x.clone(),
                h_prev: std::mem::replace(&mut h_prev, h_next.clone()),
                c_prev: std::mem::replace(&mut c_prev, c),
                i,
                f,
                g,
                o,
                tanh_c,
            });
            outputs.push(h_next);
        }

        LstmTrace { steps, outputs }
    }

    /// Backpropagate through time, accumulating weight gradients
    ///
    /// `d_outputs[t]` is the loss gradient with respect to the hidden state at step `t`.
    /// Returns the gradient with respect to each input.
    pub fn backward(&mut self, trace: &LstmTrace, d_outputs: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let h = self.hidden_size;
        let mut dh_next = vec![0.0; h];
        let mut dc_next = vec![0.0; h];
        let mut d_inputs = vec![vec![0.0; self.input_size]; trace.steps.len()];

        for (t, step) in trace.steps.iter().enumerate().rev() {
            let mut dz = vec![0.0; 4 * h];
            for k in 0..h {
                let dh = d_outputs[t][k] + dh_next[k];
                let d_o = dh * step.tanh_c[k];
                let dc = dh * step.o[k] * (1.0 - step.tanh_c[k] * step.tanh_c[k]) + dc_next[k];
                let d_i = dc * step.g[k];
                let d_f = dc * step.c_prev[k];
                let d_g = dc * step.i[k];
                dc_next[k] = dc * step.f[k];

                dz[k] = d_i * step.i[k] * (1.0 - step.i[k]);
                dz[h + k] = d_f * step.f[k] * (1.0 - step.f[k]);
                dz[2 * h + k] = d_g * (1.0 - step.g[k] * step.g[k]);
                dz[3 * h + k] = d_o * step.o[k] * (1.0 - step.o[k]);
            }

            outer_add(&mut self.w.grad, self.input_size, &dz, &step.x);
            outer_add(&mut self.u.grad, h, &dz, &step.h_prev);
            for (g, d) in self.b.grad.iter_mut().zip(&dz) {
                *g += d;
            }

            matvec_t_add(&self.w.value, 4 * h, self.input_size, &dz, &mut d_inputs[t]);
            dh_next = vec![0.0; h];
            matvec_t_add(&self.u.value, 4 * h, h, &dz, &mut dh_next);
        }

        d_inputs
    }

    pub fn params_mut(&mut self) -> [&mut Param; 3] {
        [&mut self.w, &mut self.u, &mut self.b]
    }
}

/// Forward and backward cells over the same sequence, outputs concatenated per step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiLstmLayer {
    forward_cell: LstmCell,
    backward_cell: LstmCell,
}

/// Traces of both directions
#[derive(Debug, Clone)]
pub struct BiLstmTrace {
    forward: LstmTrace,
    backward: LstmTrace,
    /// `[forward_h(t), backward_h(t)]` for every step `t`
    pub outputs: Vec<Vec<f64>>,
}

impl BiLstmLayer {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        Self {
            forward_cell: LstmCell::new(input_size, hidden_size, rng),
            backward_cell: LstmCell::new(input_size, hidden_size, rng),
        }
    }

    pub fn input_size(&self) -> usize {
        self.forward_cell.input_size()
    }

    pub fn hidden_size(&self) -> usize {
        self.forward_cell.hidden_size()
    }

    /// Width of each output step
    pub fn output_size(&self) -> usize {
        2 * self.hidden_size()
    }

    pub fn forward(&self, xs: &[Vec<f64>]) -> BiLstmTrace {
        let forward = self.forward_cell.forward(xs);
        let reversed: Vec<Vec<f64>> = xs.iter().rev().cloned().collect();
        let backward = self.backward_cell.forward(&reversed);

        let len = xs.len();
        let outputs = (0..len)
            .map(|t| {
                let mut out = forward.outputs[t].clone();
                out.extend_from_slice(&backward.outputs[len - 1 - t]);
                out
            })
            .collect();

        BiLstmTrace {
            forward,
            backward,
            outputs,
        }
    }

    pub fn backward(&mut self, trace: &BiLstmTrace, d_outputs: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let h = self.hidden_size();
        let len = d_outputs.len();
        let d_forward: Vec<Vec<f64>> = d_outputs.iter().map(|d| d[..h].to_vec()).collect();
        let d_backward: Vec<Vec<f64>> = (0..len).map(|s| d_outputs[len - 1 - s][h..].to_vec()).collect();

        let mut d_inputs = self.forward_cell.backward(&trace.forward, &d_forward);
        let d_reversed = self.backward_cell.backward(&trace.backward, &d_backward);
        for (t, d) in d_inputs.iter_mut().enumerate() {
            for (a, b) in d.iter_mut().zip(&d_reversed[len - 1 - t]) {
                *a += b;
            }
        }
        d_inputs
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params: Vec<&mut Param> = Vec::with_capacity(6);
        params.extend(self.forward_cell.params_mut());
        params.extend(self.backward_cell.params_mut());
        params
    }
}
