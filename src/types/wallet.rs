// src/types/wallet.rs

use serde::{Deserialize, Serialize};

use super::Direction;
use crate::error::{Result, SimError};

/// An agent's two balances. Both stay >= 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub sol: f64,
    pub token: f64,
}

impl Wallet {
    pub fn new(sol: f64, token: f64) -> Self {
        Self { sol, token }
    }

    /// Balance of the asset a swap in `direction` spends.
    pub fn input_balance(&self, direction: Direction) -> f64 {
        match direction {
            Direction::SolToToken => self.sol,
            Direction::TokenToSol => self.token,
        }
    }

    pub fn can_cover(&self, direction: Direction, amount: f64) -> bool {
        self.input_balance(direction) >= amount
    }

    /// Move `input` out and `output` in. Fails without touching anything.
    pub fn settle(&mut self, direction: Direction, input: f64, output: f64) -> Result<()> {
        let available = self.input_balance(direction);
        if input > available {
            return Err(SimError::InsufficientBalance {
                needed: input,
                available,
            });
        }
        match direction {
            Direction::SolToToken => {
                self.sol = (self.sol - input).max(0.0);
                self.token += output;
            }
            Direction::TokenToSol => {
                self.token = (self.token - input).max(0.0);
                self.sol += output;
            }
        }
        Ok(())
    }

    pub fn deposit(&mut self, sol: f64, token: f64) -> Result<()> {
        if sol < 0.0 || token < 0.0 || !sol.is_finite() || !token.is_finite() {
            return Err(SimError::InvalidConfiguration(format!(
                "deposit amounts must be non-negative, got sol={sol} token={token}"
            )));
        }
        self.sol += sol;
        self.token += token;
        Ok(())
    }

    pub fn withdraw(&mut self, sol: f64, token: f64) -> Result<()> {
        if sol < 0.0 || token < 0.0 {
            return Err(SimError::InvalidConfiguration(
                "withdraw amounts must be non-negative".into(),
            ));
        }
        if sol > self.sol {
            return Err(SimError::InsufficientBalance {
                needed: sol,
                available: self.sol,
            });
        }
        if token > self.token {
            return Err(SimError::InsufficientBalance {
                needed: token,
                available: self.token,
            });
        }
        self.sol -= sol;
        self.token -= token;
        Ok(())
    }

    /// Wallet value in SOL at `price` (SOL per token).
    pub fn value_in_sol(&self, price: f64) -> f64 {
        self.sol + self.token * price
    }
}
