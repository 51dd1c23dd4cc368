//! Adam with global-norm gradient clipping

use super::lstm::Param;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-7;

/// Scale every gradient so their joint L2 norm is at most `max_norm`; returns the norm before clipping
pub fn clip_global_norm(params: &mut [&mut Param], max_norm: f64) -> f64 {
    let norm = params
        .iter()
        .flat_map(|p| p.grad.iter())
        .map(|g| g * g)
        .sum::<f64>()
        .sqrt();

    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for param in params.iter_mut() {
            param.grad.iter_mut().for_each(|g| *g *= scale);
        }
    }
    norm
}

/// Adam state for a fixed, ordered list of parameters
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    step: i32,
    moments: Vec<(Vec<f64>, Vec<f64>)>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            step: 0,
            moments: Vec::new(),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// Apply one update; `params` must be passed in the same order every call
    pub fn step(&mut self, params: &mut [&mut Param]) {
        if self.moments.len() != params.len() {
            self.moments = params
                .iter()
                .map(|p| (vec![0.0; p.len()], vec![0.0; p.len()]))
                .collect();
        }

        self.step = self.step.saturating_add(1);
        let bias1 = 1.0 - BETA1.powi(self.step);
        let bias2 = 1.0 - BETA2.powi(self.step);

        for (param, (m, v)) in params.iter_mut().zip(self.moments.iter_mut()) {
            for (k, value) in param.value.iter_mut().enumerate() {
                let g = param.grad[k];
                m[k] = BETA1 * m[k] + (1.0 - BETA1) * g;
                v[k] = BETA2 * v[k] + (1.0 - BETA2) * g * g;
                let m_hat = m[k] / bias1;
                let v_hat = v[k] / bias2;
                *value -= self.learning_rate * m_hat / (v_hat.sqrt() + EPSILON);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn clipping_rescales_to_max_norm() {
        let mut a = Param::zeros(2);
        let mut b = Param::zeros(1);
        a.grad = vec![3.0, 0.0];
        b.grad = vec![4.0];

        let norm = clip_global_norm(&mut [&mut a, &mut b], 1.0);
        assert_relative_eq!(norm, 5.0);
        assert_relative_eq!(a.grad[0], 0.6);
        assert_relative_eq!(b.grad[0], 0.8);
    }

    #[test]
    fn small_gradients_are_untouched() {
        let mut a = Param::zeros(1);
        a.grad = vec![0.5];
        clip_global_norm(&mut [&mut a], 1.0);
        assert_eq!(a.grad, vec![0.5]);
    }

    #[test]
    fn adam_descends_a_quadratic() {
        let mut x = Param::zeros(1);
        x.value = vec![3.0];
        let mut adam = Adam::new(0.1);
        for _ in 0..500 {
            x.grad = vec![2.0 * (x.value[0] - 1.0)];
            adam.step(&mut [&mut x]);
        }
        assert!((x.value[0] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut x = Param::zeros(1);
        x.grad = vec![42.0];
        let mut adam = Adam::new(0.01);
        adam.step(&mut [&mut x]);
        assert_relative_eq!(x.value[0], -0.01, epsilon = 1e-8);
    }
}
