// src/simulators/gbm.rs

use rand::SeedableRng;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand_distr::Normal;
use std::collections::VecDeque;

use super::market_trait::Marketable;
use crate::error::{Result, SimError};

const HISTORY_LEN: usize = 512;
/// Steps per simulated year.
const STEPS_PER_YEAR: f64 = 252.0;

/// Geometric Brownian motion used as an external reference price.
pub struct GBMSimulator {
    initial_price: f64,
    drift: f64,
    volatility: f64,
    current_price: f64,
    history: VecDeque<f64>,
    seed: Option<u64>,
    rng: StdRng,
    normal_dist: Normal<f64>,
}

impl GBMSimulator {
    /// `drift` and `volatility` are annualised.
    pub fn new(initial_price: f64, drift: f64, volatility: f64, seed: Option<u64>) -> Result<Self> {
        if !(initial_price > 0.0 && initial_price.is_finite()) {
            return Err(SimError::InvalidConfiguration(format!(
                "GBM start price must be positive, got {initial_price}"
            )));
        }
        if !(volatility >= 0.0 && volatility.is_finite()) {
            return Err(SimError::InvalidConfiguration(format!(
                "GBM volatility must be non-negative, got {volatility}"
            )));
        }
        let normal_dist = Normal::new(0.0, 1.0)
            .map_err(|e| SimError::InvalidConfiguration(e.to_string()))?;
        let mut history = VecDeque::with_capacity(HISTORY_LEN);
        history.push_back(initial_price);
        Ok(Self {
            initial_price,
            drift,
            volatility,
            current_price: initial_price,
            history,
            seed,
            rng: make_rng(seed),
            normal_dist,
        })
    }

    /// Advance one step and return the new price.
    pub fn step(&mut self) -> f64 {
        let step_drift = self.drift / STEPS_PER_YEAR;
        let step_vol = self.volatility / STEPS_PER_YEAR.sqrt();
        let shock = self.normal_dist.sample(&mut self.rng);
        // exp((mu - sigma^2 / 2) dt + sigma dW)
        self.current_price *= ((step_drift - 0.5 * step_vol.powi(2)) + step_vol * shock).exp();
        self.history.push_back(self.current_price);
        if self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
        self.current_price
    }

    pub fn reset(&mut self) {
        self.current_price = self.initial_price;
        self.history.clear();
        self.history.push_back(self.initial_price);
        self.rng = make_rng(self.seed);
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

impl Marketable for GBMSimulator {
    fn current_price(&self) -> f64 {
        self.current_price
    }

    fn recent_prices(&self, n: usize) -> Vec<f64> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).copied().collect()
    }
}
