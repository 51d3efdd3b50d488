// src/types/trade.rs

use serde::{Deserialize, Serialize};

use super::{AgentId, Timestamp, TxId};

/// Which way a swap moves through the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Buy: SOL in, token out.
    SolToToken,
    /// Sell: token in, SOL out.
    TokenToSol,
}

impl Direction {
    pub fn is_buy(self) -> bool {
        self == Direction::SolToToken
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Confirmed,
    Failed,
}

/// Immutable record of one swap attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TxId,
    pub agent_id: AgentId,
    pub direction: Direction,
    pub input_amount: f64,
    pub output_amount: f64,
    /// SOL per token actually paid or received.
    pub effective_price: f64,
    /// Charged in the input asset.
    pub fee: f64,
    pub price_before: f64,
    pub price_after: f64,
    pub status: TxStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub timestamp: Timestamp,
}

impl Transaction {
    pub fn is_confirmed(&self) -> bool {
        self.status == TxStatus::Confirmed
    }

    /// SOL side of the trade, used for volume accounting.
    pub fn sol_volume(&self) -> f64 {
        match self.direction {
            Direction::SolToToken => self.input_amount,
            Direction::TokenToSol => self.output_amount,
        }
    }
}

/// What a successful swap hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapReceipt {
    pub output_amount: f64,
    pub effective_price: f64,
    pub fee_charged: f64,
    pub price_impact: f64,
    pub transaction: Transaction,
}
