//! Oscillator indicator implementations
//!
//! - Relative Strength Index (RSI)
//! - Moving Average Convergence Divergence (MACD)

use crate::moving_averages::{ExponentialMovingAverage, SimpleMovingAverage};
use crate::{ensure_finite, MathError, Result};

/// Relative Strength Index over a rolling window of day-to-day changes.
///
/// Average gains and losses are plain means over the last `period` changes, and the
/// ratio is rescaled to `[0, 100]`.
#[derive(Debug, Clone)]
pub struct RelativeStrengthIndex {
    period: usize,
    previous_value: Option<f64>,
    gains: SimpleMovingAverage,
    losses: SimpleMovingAverage,
}

impl RelativeStrengthIndex {
    /// Create a new RSI with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            previous_value: None,
            gains: SimpleMovingAverage::new(period)?,
            losses: SimpleMovingAverage::new(period)?,
        })
    }

    /// Update the RSI with a new value
    pub fn update(&mut self, value: f64) -> Result<()> {
        ensure_finite(value)?;

        if let Some(previous) = self.previous_value {
            let change = value - previous;
            self.gains.update(change.max(0.0))?;
            self.losses.update((-change).max(0.0))?;
        }

        self.previous_value = Some(value);
        Ok(())
    }

    /// Get the current RSI value (0-100)
    pub fn value(&self) -> Result<f64> {
        let (avg_gain, avg_loss) = match (self.gains.value(), self.losses.value()) {
            (Ok(gain), Ok(loss)) => (gain, loss),
            _ => {
                return Err(MathError::InsufficientData(format!(
                    "Not enough data for RSI calculation. Need {} values.",
                    self.period + 1
                )))
            }
        };

        if avg_loss <= f64::EPSILON {
            // A flat window is neutral, a window with only gains is saturated
            return Ok(if avg_gain <= f64::EPSILON { 50.0 } else { 100.0 });
        }

        let rs = avg_gain / avg_loss;
        Ok(100.0 - (100.0 / (1.0 + rs)))
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }

    /// Reset the RSI, clearing all values
    pub fn reset(&mut self) {
        self.previous_value = None;
        self.gains.reset();
        self.losses.reset();
    }
}

/// Moving Average Convergence Divergence (MACD) implementation
#[derive(Debug, Clone)]
pub struct Macd {
    fast_ema: ExponentialMovingAverage,
    slow_ema: ExponentialMovingAverage,
    signal_ema: ExponentialMovingAverage,
    count: usize,
    line_count: usize,
}

impl Macd {
    /// Create a new MACD with the specified parameters
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Result<Self> {
        if fast_period >= slow_period {
            return Err(MathError::InvalidInput(
                "Fast period must be smaller than slow period".to_string(),
            ));
        }

        Ok(Self {
            fast_ema: ExponentialMovingAverage::new(fast_period)?,
            slow_ema: ExponentialMovingAverage::new(slow_period)?,
            signal_ema: ExponentialMovingAverage::new(signal_period)?,
            count: 0,
            line_count: 0,
        })
    }

    /// The conventional 12/26/9 configuration
    pub fn standard() -> Result<Self> {
        Self::new(12, 26, 9)
    }

    /// Update the MACD with a new value
    ///
    /// The MACD line exists once `slow_period` values have been seen; the signal line once
    /// `signal_period` MACD values have been seen.
    pub fn update(&mut self, value: f64) -> Result<()> {
        self.fast_ema.update(value)?;
        self.slow_ema.update(value)?;
        self.count += 1;
        if self.count < self.slow_period() {
            return Ok(());
        }
        let macd = self.macd_value()?;
        self.line_count += 1;
        self.signal_ema.update(macd)
    }

    /// Get the current MACD line value (fast EMA - slow EMA)
    pub fn macd_value(&self) -> Result<f64> {
        if self.count < self.slow_period() {
            return Err(MathError::InsufficientData(format!(
                "MACD line needs {} values, got {}",
                self.slow_period(),
                self.count
            )));
        }
        match (self.fast_ema.value(), self.slow_ema.value()) {
            (Ok(fast), Ok(slow)) => Ok(fast - slow),
            _ => Err(MathError::InsufficientData(
                "Not enough data to calculate MACD line".to_string(),
            )),
        }
    }

    /// Get the current signal line value (EMA of MACD)
    pub fn signal_value(&self) -> Result<f64> {
        if self.line_count < self.signal_period() {
            return Err(MathError::InsufficientData(format!(
                "Signal line needs {} MACD values, got {}",
                self.signal_period(),
                self.line_count
            )));
        }
        self.signal_ema.value().map_err(|_| {
            MathError::InsufficientData("Not enough data to calculate signal line".to_string())
        })
    }

    /// Get the current histogram value (MACD line - signal line)
    pub fn histogram(&self) -> Result<f64> {
        Ok(self.macd_value()? - self.signal_value()?)
    }

    /// Get the fast period
    pub fn fast_period(&self) -> usize {
        self.fast_ema.period()
    }

    /// Get the slow period
    pub fn slow_period(&self) -> usize {
        self.slow_ema.period()
    }

    /// Get the signal period
    pub fn signal_period(&self) -> usize {
        self.signal_ema.period()
    }

    /// Reset the MACD, clearing all values
    pub fn reset(&mut self) {
        self.fast_ema.reset();
        self.slow_ema.reset();
        self.signal_ema.reset();
        self.count = 0;
        self.line_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rsi_needs_period_plus_one_values() {
        let mut rsi = RelativeStrengthIndex::new(3).unwrap();
        for v in [1.0, 2.0, 3.0] {
            rsi.update(v).unwrap();
            assert!(rsi.value().is_err());
        }
        rsi.update(4.0).unwrap();
        assert_relative_eq!(rsi.value().unwrap(), 100.0);
    }

    #[test]
    fn test_rsi_balanced_moves_is_fifty() {
        let mut rsi = RelativeStrengthIndex::new(4).unwrap();
        for v in [10.0, 12.0, 10.0, 12.0, 10.0] {
            rsi.update(v).unwrap();
        }
        assert_relative_eq!(rsi.value().unwrap(), 50.0);
    }

    #[test]
    fn test_rsi_flat_window_is_neutral() {
        let mut rsi = RelativeStrengthIndex::new(2).unwrap();
        for _ in 0..5 {
            rsi.update(7.0).unwrap();
        }
        assert_relative_eq!(rsi.value().unwrap(), 50.0);
    }

    #[test]
    fn test_rsi_bounded() {
        let mut rsi = RelativeStrengthIndex::new(7).unwrap();
        for i in 0..40 {
            rsi.update(((i * 7) % 11) as f64).unwrap();
            if let Ok(v) = rsi.value() {
                assert!((0.0..=100.0).contains(&v));
            }
        }
    }

    #[test]
    fn test_macd_rising_series_is_positive() {
        let mut macd = Macd::standard().unwrap();
        for i in 0..60 {
            macd.update(i as f64).unwrap();
        }
        assert!(macd.macd_value().unwrap() > 0.0);
        let hist = macd.histogram().unwrap();
        assert_relative_eq!(
            hist,
            macd.macd_value().unwrap() - macd.signal_value().unwrap()
        );
        assert_eq!(macd.fast_period(), 12);
        assert_eq!(macd.slow_period(), 26);
        assert_eq!(macd.signal_period(), 9);
    }

    #[test]
    fn test_macd_waits_for_full_windows() {
        let mut macd = Macd::standard().unwrap();
        for i in 0..25 {
            macd.update(i as f64).unwrap();
            assert!(macd.macd_value().is_err());
            assert!(macd.signal_value().is_err());
        }
        macd.update(25.0).unwrap();
        assert!(macd.macd_value().is_ok());
        for i in 26..33 {
            macd.update(i as f64).unwrap();
            assert!(macd.signal_value().is_err());
            assert!(macd.histogram().is_err());
        }
        macd.update(33.0).unwrap();
        assert!(macd.signal_value().is_ok());
        assert!(macd.histogram().is_ok());

        macd.reset();
        macd.update(1.0).unwrap();
        assert!(macd.macd_value().is_err());
    }

    #[test]
    fn test_macd_rejects_inverted_periods() {
        assert!(Macd::new(26, 12, 9).is_err());
    }
}
