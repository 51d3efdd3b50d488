// src/simulators/pool_state.rs

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{Result, SimError};
use crate::types::Timestamp;

/// Relative tolerance for `|x * y - k|`.
pub const INVARIANT_EPSILON: f64 = 1e-6;
/// Samples kept for charting; the oldest are dropped first.
pub const MAX_PRICE_HISTORY: usize = 10_000;

/// Rolling window for the `*_24h` fields.
pub fn volume_window() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: Timestamp,
    /// SOL per token.
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeSample {
    pub timestamp: Timestamp,
    /// SOL traded.
    pub volume: f64,
}

/// Snapshot of the liquidity pool. Only the market maker mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolState {
    pub sol_reserve: f64,
    pub token_reserve: f64,
    /// Always `sol_reserve * token_reserve`; rebuilt on load.
    pub k: f64,
    pub fee_rate: f64,
    pub cumulative_volume: f64,
    pub volume_24h: f64,
    pub price_history: VecDeque<PriceSample>,
    pub high_price_24h: f64,
    pub low_price_24h: f64,
    pub last_trade_at: Option<Timestamp>,
    /// Bumped on every mutation; stores keep only newer versions.
    pub version: u64,
    pub swap_count: u64,
    #[serde(default)]
    pub volume_window: VecDeque<VolumeSample>,
}

impl PoolState {
    pub fn new(sol_reserve: f64, token_reserve: f64, fee_rate: f64, now: Timestamp) -> Self {
        let price = sol_reserve / token_reserve;
        let mut history = VecDeque::new();
        history.push_back(PriceSample {
            timestamp: now,
            price,
        });
        Self {
            sol_reserve,
            token_reserve,
            k: sol_reserve * token_reserve,
            fee_rate,
            cumulative_volume: 0.0,
            volume_24h: 0.0,
            price_history: history,
            high_price_24h: price,
            low_price_24h: price,
            last_trade_at: None,
            version: 0,
            swap_count: 0,
            volume_window: VecDeque::new(),
        }
    }

    /// Spot price in SOL per token.
    #[inline]
    pub fn price(&self) -> f64 {
        self.sol_reserve / self.token_reserve
    }

    /// `(reserve_in, reserve_out)` for a swap in the given direction.
    #[inline]
    pub fn reserves_for(&self, buy: bool) -> (f64, f64) {
        if buy {
            (self.sol_reserve, self.token_reserve)
        } else {
            (self.token_reserve, self.sol_reserve)
        }
    }

    pub fn check_invariant(&self) -> Result<()> {
        if !(self.sol_reserve > 0.0 && self.token_reserve > 0.0) {
            return Err(SimError::InvariantViolation(format!(
                "non-positive reserve: sol={} token={}",
                self.sol_reserve, self.token_reserve
            )));
        }
        let product = self.sol_reserve * self.token_reserve;
        if !product.is_finite() || !self.k.is_finite() {
            return Err(SimError::InvariantViolation(format!(
                "reserve product is not finite: {product}"
            )));
        }
        let drift = (product - self.k).abs();
        if drift > INVARIANT_EPSILON * self.k {
            return Err(SimError::InvariantViolation(format!(
                "k drifted by {drift:e} (k={}, x*y={product})",
                self.k
            )));
        }
        Ok(())
    }

    /// Stored `k` is never trusted: rebuild it from the reserves.
    pub fn rehydrated(mut self) -> Result<Self> {
        self.k = self.sol_reserve * self.token_reserve;
        self.check_invariant()?;
        Ok(self)
    }

    /// Bookkeeping after reserves changed because of a trade.
    pub(crate) fn record_trade(&mut self, now: Timestamp, sol_volume: f64) {
        let price = self.price();
        self.k = self.sol_reserve * self.token_reserve;
        self.cumulative_volume += sol_volume;
        self.volume_24h += sol_volume;
        self.volume_window.push_back(VolumeSample {
            timestamp: now,
            volume: sol_volume,
        });
        self.push_price(now, price);
        self.high_price_24h = self.high_price_24h.max(price);
        self.low_price_24h = self.low_price_24h.min(price);
        self.last_trade_at = Some(now);
        self.swap_count += 1;
        self.version += 1;
    }

    fn push_price(&mut self, now: Timestamp, price: f64) {
        self.price_history.push_back(PriceSample {
            timestamp: now,
            price,
        });
        while self.price_history.len() > MAX_PRICE_HISTORY {
            self.price_history.pop_front();
        }
    }

    /// Drop window samples older than 24h and rebuild the windowed fields.
    /// `price_history` itself is left alone.
    pub fn sync_window(&mut self, now: Timestamp) {
        let cutoff = now - volume_window();
        while self
            .volume_window
            .front()
            .is_some_and(|s| s.timestamp < cutoff)
        {
            self.volume_window.pop_front();
        }
        self.volume_24h = self.volume_window.iter().map(|s| s.volume).sum();

        let spot = self.price();
        let (high, low) = self
            .price_history
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .fold((spot, spot), |(hi, lo), s| (hi.max(s.price), lo.min(s.price)));
        self.high_price_24h = high;
        self.low_price_24h = low;
        self.version += 1;
    }

    /// Last `n` prices, oldest first.
    pub fn recent_prices(&self, n: usize) -> Vec<f64> {
        let skip = self.price_history.len().saturating_sub(n);
        self.price_history.iter().skip(skip).map(|s| s.price).collect()
    }
}
