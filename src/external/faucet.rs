// src/external/faucet.rs

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{Result, SimError};
use crate::types::AgentId;

/// Source of starting SOL for new agents.
#[async_trait]
pub trait Faucet: Send + Sync {
    /// Returns how much was actually granted, possibly less than asked.
    async fn airdrop(&self, agent_id: AgentId, sol: f64) -> Result<f64>;
}

/// Faucet with a finite budget. Grants shrink to what is left.
pub struct SimulatedFaucet {
    remaining: Mutex<f64>,
}

impl SimulatedFaucet {
    pub fn new(budget_sol: f64) -> Self {
        Self {
            remaining: Mutex::new(budget_sol.max(0.0)),
        }
    }

    /// Effectively bottomless.
    pub fn unlimited() -> Self {
        Self::new(f64::MAX)
    }

    pub fn remaining(&self) -> f64 {
        *self.remaining.lock()
    }
}

#[async_trait]
impl Faucet for SimulatedFaucet {
    async fn airdrop(&self, agent_id: AgentId, sol: f64) -> Result<f64> {
        if !(sol >= 0.0 && sol.is_finite()) {
            return Err(SimError::InvalidConfiguration(format!(
                "airdrop amount must be non-negative, got {sol}"
            )));
        }
        let mut remaining = self.remaining.lock();
        let granted = sol.min(*remaining);
        *remaining -= granted;
        if granted < sol {
            warn!(agent_id, requested = sol, granted, "faucet budget running dry");
        }
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn budget_caps_grants() {
        let faucet = SimulatedFaucet::new(10.0);
        assert_eq!(faucet.airdrop(1, 6.0).await.unwrap(), 6.0);
        assert_eq!(faucet.airdrop(2, 6.0).await.unwrap(), 4.0);
        assert_eq!(faucet.airdrop(3, 1.0).await.unwrap(), 0.0);
        assert_eq!(faucet.remaining(), 0.0);
    }

    #[tokio::test]
    async fn negative_request_rejected() {
        let faucet = SimulatedFaucet::unlimited();
        assert!(faucet.airdrop(1, -1.0).await.is_err());
    }
}
