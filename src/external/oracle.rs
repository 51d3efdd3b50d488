// src/external/oracle.rs

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::Result;
use crate::simulators::gbm::GBMSimulator;

/// Reference price feed, SOL per unit of `asset_id`.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// `None` when the oracle has no price for the asset.
    async fn get_price(&self, asset_id: &str) -> Result<Option<f64>>;
}

/// Serves a fixed table of prices.
#[derive(Debug, Clone, Default)]
pub struct FixedOracle {
    prices: HashMap<String, f64>,
}

impl FixedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, asset_id: impl Into<String>, price: f64) -> Self {
        self.prices.insert(asset_id.into(), price);
        self
    }
}

#[async_trait]
impl PriceOracle for FixedOracle {
    async fn get_price(&self, asset_id: &str) -> Result<Option<f64>> {
        Ok(self.prices.get(asset_id).copied())
    }
}

/// A random-walk price for one asset. Every query advances the walk one step.
pub struct GbmOracle {
    asset_id: String,
    walk: Mutex<GBMSimulator>,
}

impl GbmOracle {
    pub fn new(asset_id: impl Into<String>, walk: GBMSimulator) -> Self {
        Self {
            asset_id: asset_id.into(),
            walk: Mutex::new(walk),
        }
    }
}

#[async_trait]
impl PriceOracle for GbmOracle {
    async fn get_price(&self, asset_id: &str) -> Result<Option<f64>> {
        if asset_id != self.asset_id {
            return Ok(None);
        }
        Ok(Some(self.walk.lock().step()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_oracle_knows_only_its_table() {
        let oracle = FixedOracle::new().with_price("SIM", 0.002);
        assert_eq!(oracle.get_price("SIM").await.unwrap(), Some(0.002));
        assert_eq!(oracle.get_price("BONK").await.unwrap(), None);
    }

    #[tokio::test]
    async fn gbm_oracle_walks_its_asset() {
        let walk = GBMSimulator::new(0.001, 0.0, 0.5, Some(42)).unwrap();
        let oracle = GbmOracle::new("SIM", walk);
        let a = oracle.get_price("SIM").await.unwrap().unwrap();
        let b = oracle.get_price("SIM").await.unwrap().unwrap();
        assert!(a > 0.0 && b > 0.0);
        assert_ne!(a, b);
        assert_eq!(oracle.get_price("SOL").await.unwrap(), None);
    }
}
