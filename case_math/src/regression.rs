//! Rolling regression-style statistics
//!
//! - Least-squares slope of the trailing window against its day index
//! - Lagged autocorrelation inside the trailing window

use crate::moving_averages::SimpleMovingAverage;
use crate::{MathError, Result};

/// Linear-regression slope over the trailing window
#[derive(Debug, Clone)]
pub struct RollingSlope {
    window: SimpleMovingAverage,
}

impl RollingSlope {
    /// Create a new rolling slope with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period < 2 {
            return Err(MathError::InvalidInput(
                "Period must be at least 2 for linear regression".to_string(),
            ));
        }

        Ok(Self {
            window: SimpleMovingAverage::new(period)?,
        })
    }

    /// Update the regression with a new value
    pub fn update(&mut self, value: f64) -> Result<()> {
        self.window.update(value)
    }

    /// Get the current slope (change per day)
    pub fn value(&self) -> Result<f64> {
        let y_mean = self.window.value()?;
        let values = self.window.window();
        let n = values.len() as f64;
        let x_mean = (n - 1.0) / 2.0;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, &y) in values.iter().enumerate() {
            let x = i as f64 - x_mean;
            numerator += x * (y - y_mean);
            denominator += x * x;
        }

        Ok(numerator / denominator)
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.window.period()
    }

    /// Reset the regression, clearing all values
    pub fn reset(&mut self) {
        self.window.reset();
    }
}

/// Pearson correlation between the window and itself shifted by `lag` days
#[derive(Debug, Clone)]
pub struct RollingAutocorrelation {
    lag: usize,
    window: SimpleMovingAverage,
}

impl RollingAutocorrelation {
    /// Create a new rolling autocorrelation over `period` days at `lag`
    pub fn new(period: usize, lag: usize) -> Result<Self> {
        if lag == 0 || period < lag + 2 {
            return Err(MathError::InvalidInput(format!(
                "Period {} is too short for autocorrelation at lag {}",
                period, lag
            )));
        }

        Ok(Self {
            lag,
            window: SimpleMovingAverage::new(period)?,
        })
    }

    /// Update the window with a new value
    pub fn update(&mut self, value: f64) -> Result<()> {
        self.window.update(value)
    }

    /// Get the current autocorrelation in `[-1, 1]`
    pub fn value(&self) -> Result<f64> {
        self.window.value()?;
        let values: Vec<f64> = self.window.window().iter().copied().collect();
        let head = &values[..values.len() - self.lag];
        let tail = &values[self.lag..];

        let n = head.len() as f64;
        let head_mean = head.iter().sum::<f64>() / n;
        let tail_mean = tail.iter().sum::<f64>() / n;

        let mut covariance = 0.0;
        let mut head_var = 0.0;
        let mut tail_var = 0.0;
        for (a, b) in head.iter().zip(tail) {
            covariance += (a - head_mean) * (b - tail_mean);
            head_var += (a - head_mean).powi(2);
            tail_var += (b - tail_mean).powi(2);
        }

        let denominator = (head_var * tail_var).sqrt();
        if denominator < 1e-12 {
            return Err(MathError::CalculationError(
                "Window has no variance, autocorrelation undefined".to_string(),
            ));
        }

        Ok(covariance / denominator)
    }

    /// Get the lag
    pub fn lag(&self) -> usize {
        self.lag
    }

    /// Reset the window, clearing all values
    pub fn reset(&mut self) {
        self.window.reset();
    }
}
