// src/analysis/momentum.rs

use statrs::statistics::Statistics;

use crate::simulators::market_trait::Marketable;

/// Summary of recent price action, all values dimensionless.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketSignal {
    /// Trend strength in [-1, 1]; positive means prices have been rising.
    pub momentum: f64,
    /// Per-step standard deviation of log returns.
    pub volatility: f64,
    /// Number of returns the estimate is built from.
    pub samples: usize,
}

/// Rolling momentum and volatility over the last `window` prices.
#[derive(Debug, Clone)]
pub struct MomentumEstimator {
    window: usize,
}

impl Default for MomentumEstimator {
    fn default() -> Self {
        Self::new(20)
    }
}

impl MomentumEstimator {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn from_market<M: Marketable + ?Sized>(&self, market: &M) -> MarketSignal {
        self.estimate(&market.recent_prices(self.window))
    }

    /// `prices` oldest first. Fewer than two usable prices gives a flat signal.
    pub fn estimate(&self, prices: &[f64]) -> MarketSignal {
        let skip = prices.len().saturating_sub(self.window);
        let returns: Vec<f64> = prices[skip..]
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1] > 0.0)
            .map(|w| (w[1] / w[0]).ln())
            .collect();
        if returns.is_empty() {
            return MarketSignal::default();
        }

        let mean = returns.iter().mean();
        let volatility = if returns.len() > 1 {
            returns.iter().std_dev()
        } else {
            0.0
        };

        // Trend t-statistic squashed into [-1, 1].
        let momentum = if volatility > 1e-12 {
            let t = mean / volatility * (returns.len() as f64).sqrt();
            (t / 2.0).tanh()
        } else if mean.abs() > 1e-12 {
            mean.signum()
        } else {
            0.0
        };

        MarketSignal {
            momentum,
            volatility,
            samples: returns.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_prices_have_no_momentum() {
        let est = MomentumEstimator::new(10);
        let s = est.estimate(&[1.0; 8]);
        assert_eq!(s.momentum, 0.0);
        assert_eq!(s.volatility, 0.0);
        assert_eq!(s.samples, 7);
    }

    #[test]
    fn rising_prices_are_positive() {
        let est = MomentumEstimator::new(10);
        let prices: Vec<f64> = (0..10).map(|i| 1.0 + i as f64 * 0.01 + (i % 2) as f64 * 0.002).collect();
        let s = est.estimate(&prices);
        assert!(s.momentum > 0.5, "momentum was {}", s.momentum);
        assert!(s.volatility > 0.0);
    }

    #[test]
    fn falling_prices_are_negative() {
        let est = MomentumEstimator::new(5);
        let s = est.estimate(&[1.0, 0.9, 0.8, 0.7]);
        assert!(s.momentum < 0.0);
        assert!(s.momentum >= -1.0);
    }

    #[test]
    fn short_or_empty_series_is_flat() {
        let est = MomentumEstimator::default();
        assert_eq!(est.estimate(&[]), MarketSignal::default());
        assert_eq!(est.estimate(&[0.001]), MarketSignal::default());
    }

    #[test]
    fn only_the_window_is_used() {
        let est = MomentumEstimator::new(3);
        // Old crash followed by a flat tail
        let s = est.estimate(&[10.0, 1.0, 1.0, 1.0]);
        assert_eq!(s.samples, 2);
        assert_eq!(s.momentum, 0.0);
    }
}
