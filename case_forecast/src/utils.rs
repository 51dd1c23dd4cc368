//! Utility functions for the case_forecast crate

/// Difference a series at `lag` (1 for a regular difference, 7 for a weekly one)
pub fn difference(series: &[f64], lag: usize) -> Vec<f64> {
    if lag == 0 || series.len() <= lag {
        return Vec::new();
    }
    series
        .iter()
        .skip(lag)
        .zip(series.iter())
        .map(|(curr, prev)| curr - prev)
        .collect()
}

/// Invert one differencing step for values forecast past the end of `base`
pub fn undifference(base: &[f64], forecast: &[f64], lag: usize) -> Vec<f64> {
    let mut extended = base.to_vec();
    for &step in forecast {
        let anchor = if extended.len() >= lag {
            extended[extended.len() - lag]
        } else {
            0.0
        };
        extended.push(anchor + step);
    }
    extended.split_off(base.len())
}

/// Ordinary least squares fit
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Vec<f64>,
    pub rss: f64,
    pub n_obs: usize,
    /// Diagonal of `(X'X)^-1`, for coefficient standard errors
    pub xtx_inv_diag: Vec<f64>,
}

impl OlsFit {
    /// Standard error of coefficient `idx`, `None` when the residual variance vanishes
    pub fn standard_error(&self, idx: usize) -> Option<f64> {
        let dof = self.n_obs.checked_sub(self.coefficients.len())?;
        if dof == 0 {
            return None;
        }
        let sigma2 = self.rss / dof as f64;
        let se = (sigma2 * self.xtx_inv_diag[idx]).sqrt();
        (se.is_finite() && se > 1e-12).then_some(se)
    }
}

/// Solve `y = X b` by the normal equations; `None` when `X'X` is singular
pub fn ols(rows: &[Vec<f64>], y: &[f64]) -> Option<OlsFit> {
    let k = rows.first()?.len();
    if k == 0 || rows.len() != y.len() || rows.len() < k {
        return None;
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in rows.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * target;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let inverse = invert(&xtx)?;
    let coefficients: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| inverse[i][j] * xty[j]).sum())
        .collect();

    let rss = rows
        .iter()
        .zip(y)
        .map(|(row, &target)| {
            let fitted: f64 = row.iter().zip(&coefficients).map(|(x, b)| x * b).sum();
            (target - fitted).powi(2)
        })
        .sum();

    Some(OlsFit {
        xtx_inv_diag: (0..k).map(|i| inverse[i][i]).collect(),
        coefficients,
        rss,
        n_obs: rows.len(),
    })
}

/// Gauss-Jordan inversion with partial pivoting
fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let scale = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].abs())
        .fold(0.0, f64::max)
        .max(1.0);

    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let pivot = (col..n).max_by(|&r1, &r2| {
            a[r1][col]
                .abs()
                .partial_cmp(&a[r2][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-10 * scale {
            return None;
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let diag = a[col][col];
        for j in 0..n {
            a[col][j] /= diag;
            inv[col][j] /= diag;
        }
        for row in 0..n {
            if row != col {
                let factor = a[row][col];
                if factor != 0.0 {
                    for j in 0..n {
                        a[row][j] -= factor * a[col][j];
                        inv[row][j] -= factor * inv[col][j];
                    }
                }
            }
        }
    }

    Some(inv)
}
