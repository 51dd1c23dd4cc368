//! Volatility indicator implementations
//!
//! - Rolling standard deviation
//! - Bollinger-style bands (mean ± k·std) and the position of a value inside them

use crate::moving_averages::SimpleMovingAverage;
use crate::{MathError, Result};

/// Rolling population standard deviation over a fixed window
#[derive(Debug, Clone)]
pub struct StandardDeviation {
    sma: SimpleMovingAverage,
}

impl StandardDeviation {
    /// Create a new StandardDeviation with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period < 2 {
            return Err(MathError::InvalidInput(
                "Period must be at least 2 for a standard deviation".to_string(),
            ));
        }

        Ok(Self {
            sma: SimpleMovingAverage::new(period)?,
        })
    }

    /// Update the StandardDeviation with a new value
    pub fn update(&mut self, value: f64) -> Result<()> {
        self.sma.update(value)
    }

    /// Get the current window mean
    pub fn mean(&self) -> Result<f64> {
        self.sma.value()
    }

    /// Get the current standard deviation
    pub fn value(&self) -> Result<f64> {
        let mean = self.sma.value()?;
        let window = self.sma.window();
        let variance = window
            .iter()
            .map(|&value| {
                let diff = value - mean;
                diff * diff
            })
            .sum::<f64>()
            / window.len() as f64;

        Ok(variance.sqrt())
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.sma.period()
    }

    /// Reset the StandardDeviation, clearing all values
    pub fn reset(&mut self) {
        self.sma.reset();
    }
}

/// Bollinger Bands implementation
#[derive(Debug, Clone)]
pub struct BollingerBands {
    std_dev_multiplier: f64,
    std_dev: StandardDeviation,
}

impl BollingerBands {
    /// Create a new Bollinger Bands with the specified parameters
    pub fn new(period: usize, std_dev_multiplier: f64) -> Result<Self> {
        if std_dev_multiplier <= 0.0 {
            return Err(MathError::InvalidInput(
                "Standard deviation multiplier must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            std_dev_multiplier,
            std_dev: StandardDeviation::new(period)?,
        })
    }

    /// Update the Bollinger Bands with a new value
    pub fn update(&mut self, value: f64) -> Result<()> {
        self.std_dev.update(value)
    }

    /// Get the current middle band (SMA)
    pub fn middle_band(&self) -> Result<f64> {
        self.std_dev.mean()
    }

    /// Get the current upper band (SMA + multiplier * std_dev)
    pub fn upper_band(&self) -> Result<f64> {
        Ok(self.middle_band()? + self.std_dev.value()? * self.std_dev_multiplier)
    }

    /// Get the current lower band (SMA - multiplier * std_dev)
    pub fn lower_band(&self) -> Result<f64> {
        Ok(self.middle_band()? - self.std_dev.value()? * self.std_dev_multiplier)
    }

    /// Where `value` sits inside the band: 0 at the lower edge, 1 at the upper edge
    pub fn position(&self, value: f64) -> Result<f64> {
        let upper = self.upper_band()?;
        let lower = self.lower_band()?;

        if (upper - lower).abs() < f64::EPSILON {
            return Err(MathError::CalculationError(
                "Upper and lower bands are equal, cannot calculate band position".to_string(),
            ));
        }

        Ok((value - lower) / (upper - lower))
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.std_dev.period()
    }

    /// Get the standard deviation multiplier
    pub fn std_dev_multiplier(&self) -> f64 {
        self.std_dev_multiplier
    }

    /// Reset the bands, clearing all values
    pub fn reset(&mut self) {
        self.std_dev.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bollinger_bands_calculation() {
        let mut bb = BollingerBands::new(3, 2.0).unwrap();

        bb.update(10.0).unwrap();
        bb.update(11.0).unwrap();
        assert!(bb.upper_band().is_err());
        bb.update(9.0).unwrap();

        let middle = bb.middle_band().unwrap();
        assert_relative_eq!(middle, 10.0);

        let upper = bb.upper_band().unwrap();
        let lower = bb.lower_band().unwrap();
        assert!(upper > middle);
        assert!(lower < middle);

        assert_relative_eq!(bb.position(upper).unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(bb.position(lower).unwrap(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(bb.position(middle).unwrap(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_flat_band_has_no_position() {
        let mut bb = BollingerBands::new(2, 2.0).unwrap();
        bb.update(4.0).unwrap();
        bb.update(4.0).unwrap();
        assert!(bb.position(4.0).is_err());
    }

    #[test]
    fn test_standard_deviation_calculation() {
        let mut std_dev = StandardDeviation::new(3).unwrap();

        std_dev.update(10.0).unwrap();
        std_dev.update(20.0).unwrap();
        std_dev.update(30.0).unwrap();

        let expected = (200.0_f64 / 3.0).sqrt();
        assert_relative_eq!(std_dev.value().unwrap(), expected, epsilon = 1e-9);

        // Window slides to 20, 30, 30
        std_dev.update(30.0).unwrap();
        let mean = 80.0 / 3.0;
        let expected = ((20.0_f64 - mean).powi(2) + 2.0 * (30.0_f64 - mean).powi(2)) / 3.0;
        assert_relative_eq!(std_dev.value().unwrap(), expected.sqrt(), epsilon = 1e-9);
    }
}
