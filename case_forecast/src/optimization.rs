//! Derivative-free minimisation for conditional-sum-of-squares fitting

/// Nelder-Mead settings
#[derive(Debug, Clone, Copy)]
pub struct NelderMeadConfig {
    pub max_iter: usize,
    /// Relative spread of objective values at which the simplex counts as converged
    pub tolerance: f64,
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 2000,
            tolerance: 1e-8,
            initial_step: 0.05,
        }
    }
}

/// Outcome of a Nelder-Mead run
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimise `objective` from `initial`, keeping every coordinate inside `bounds`
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: &[(f64, f64)],
    config: NelderMeadConfig,
) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    let clamp = |point: Vec<f64>| -> Vec<f64> {
        point
            .into_iter()
            .zip(bounds)
            .map(|(x, &(lo, hi))| x.clamp(lo, hi))
            .collect()
    };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(clamp(initial.to_vec()));
    for i in 0..n {
        let mut vertex = initial.to_vec();
        vertex[i] += if initial[i].abs() > 1e-10 {
            config.initial_step * initial[i].abs()
        } else {
            config.initial_step
        };
        simplex.push(clamp(vertex));
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| objective(v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let (best, second_worst, worst) = (order[0], order[n - 1], order[n]);

        let spread = values[worst] - values[best];
        if spread.abs() <= config.tolerance * (values[best].abs() + config.tolerance) {
            converged = true;
            break;
        }

        let mut centroid = vec![0.0; n];
        for (idx, vertex) in simplex.iter().enumerate() {
            if idx != worst {
                for (c, x) in centroid.iter_mut().zip(vertex) {
                    *c += x / n as f64;
                }
            }
        }
        let towards = |from: &[f64], scale: f64| -> Vec<f64> {
            clamp(
                centroid
                    .iter()
                    .zip(from)
                    .map(|(c, x)| c + scale * (x - c))
                    .collect(),
            )
        };

        let reflected = towards(&simplex[worst], -REFLECT);
        let reflected_value = objective(&reflected);

        if reflected_value < values[best] {
            let expanded = towards(&reflected, EXPAND);
            let expanded_value = objective(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        let (contracted, threshold) = if reflected_value < values[worst] {
            (towards(&reflected, CONTRACT), reflected_value)
        } else {
            (towards(&simplex[worst], CONTRACT), values[worst])
        };
        let contracted_value = objective(&contracted);
        if contracted_value < threshold {
            simplex[worst] = contracted;
            values[worst] = contracted_value;
            continue;
        }

        let anchor = simplex[best].clone();
        for idx in 0..=n {
            if idx != best {
                let shrunk = anchor
                    .iter()
                    .zip(&simplex[idx])
                    .map(|(a, x)| a + SHRINK * (x - a))
                    .collect();
                simplex[idx] = clamp(shrunk);
                values[idx] = objective(&simplex[idx]);
            }
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    NelderMeadResult {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}
