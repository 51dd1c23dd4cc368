//! Moving average calculation implementations
//!
//! Contains implementations of the moving averages used by the feature pipeline:
//! - Simple Moving Average (SMA)
//! - Exponential Moving Average (EMA)

use crate::{ensure_finite, MathError, Result};
use std::collections::VecDeque;

/// Simple Moving Average (SMA) implementation
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl SimpleMovingAverage {
    /// Create a new Simple Moving Average with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period + 1),
            sum: 0.0,
        })
    }

    /// Update the SMA with a new value
    pub fn update(&mut self, value: f64) -> Result<()> {
        ensure_finite(value)?;
        self.values.push_back(value);
        self.sum += value;

        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
            }
        }

        Ok(())
    }

    /// Get the current SMA value
    pub fn value(&self) -> Result<f64> {
        if self.values.len() < self.period {
            return Err(MathError::InsufficientData(format!(
                "Not enough data for SMA calculation. Need {} values, have {}.",
                self.period,
                self.values.len()
            )));
        }

        Ok(self.sum / self.period as f64)
    }

    /// Values currently inside the window, oldest first
    pub fn window(&self) -> &VecDeque<f64> {
        &self.values
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }

    /// Reset the SMA, clearing all values
    pub fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }
}

/// Exponential Moving Average (EMA) implementation
///
/// Seeded with the first observation and updated with `2 / (span + 1)` weighting, so a
/// value is available from the first update onwards.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    period: usize,
    multiplier: f64,
    current_ema: Option<f64>,
}

impl ExponentialMovingAverage {
    /// Create a new Exponential Moving Average with the specified span
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            multiplier: 2.0 / (period as f64 + 1.0),
            current_ema: None,
        })
    }

    /// Update the EMA with a new value
    pub fn update(&mut self, value: f64) -> Result<()> {
        ensure_finite(value)?;
        self.current_ema = Some(match self.current_ema {
            None => value,
            // EMA = (value - EMA(previous)) * multiplier + EMA(previous)
            Some(current) => (value - current) * self.multiplier + current,
        });

        Ok(())
    }

    /// Get the current EMA value
    pub fn value(&self) -> Result<f64> {
        self.current_ema.ok_or_else(|| {
            MathError::InsufficientData("EMA has not received any values".to_string())
        })
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }

    /// Reset the EMA, clearing all values
    pub fn reset(&mut self) {
        self.current_ema = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma_calculation() {
        let mut sma = SimpleMovingAverage::new(3).unwrap();

        assert!(sma.value().is_err());

        sma.update(2.0).unwrap();
        sma.update(4.0).unwrap();
        assert!(sma.value().is_err());

        sma.update(6.0).unwrap();
        assert_relative_eq!(sma.value().unwrap(), 4.0);

        // The window slides, dropping the oldest value
        sma.update(8.0).unwrap();
        assert_relative_eq!(sma.value().unwrap(), 6.0);
        assert_eq!(sma.window().len(), 3);
    }

    #[test]
    fn test_ema_calculation() {
        let mut ema = ExponentialMovingAverage::new(3).unwrap();
        assert!(ema.value().is_err());

        ema.update(2.0).unwrap();
        assert_relative_eq!(ema.value().unwrap(), 2.0);

        // multiplier = 0.5
        ema.update(4.0).unwrap();
        assert_relative_eq!(ema.value().unwrap(), 3.0);
        ema.update(6.0).unwrap();
        assert_relative_eq!(ema.value().unwrap(), 4.5);
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(SimpleMovingAverage::new(0).is_err());
        assert!(ExponentialMovingAverage::new(0).is_err());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut sma = SimpleMovingAverage::new(2).unwrap();
        sma.update(1.0).unwrap();
        sma.update(3.0).unwrap();
        sma.reset();
        assert!(sma.value().is_err());
    }
}
