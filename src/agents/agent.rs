// src/agents/agent.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::personality::{BehaviorParams, PersonalityType};
use crate::types::{AgentId, Timestamp, Wallet};

/// One simulated trader. Never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub personality: PersonalityType,
    pub params: BehaviorParams,
    pub wallet: Wallet,
    pub active: bool,
    /// Share of a balance one trade may use, at most 1.
    pub max_position_size: f64,

    // --- Runtime state ---
    /// Current view of the market in [-1, 1].
    pub outlook: f64,
    pub last_selected_tick: Option<u64>,
    pub trades_executed: u64,
    pub failed_trades: u64,
    pub messages_posted: u64,
    pub reactions_given: u64,
    pub created_at: Timestamp,
}

impl Agent {
    pub fn new(
        id: AgentId,
        personality: PersonalityType,
        params: BehaviorParams,
        max_position_size: f64,
        wallet: Wallet,
    ) -> Self {
        Self {
            id,
            name: format!("{personality}-{id:03}"),
            personality,
            params: params.clamped(),
            wallet,
            active: true,
            max_position_size: max_position_size.clamp(0.0, 1.0),
            outlook: 0.0,
            last_selected_tick: None,
            trades_executed: 0,
            failed_trades: 0,
            messages_posted: 0,
            reactions_given: 0,
            created_at: Utc::now(),
        }
    }

    /// An agent using its personality's stock parameters.
    pub fn with_profile(id: AgentId, personality: PersonalityType, wallet: Wallet) -> Self {
        let profile = personality.profile();
        Self::new(id, personality, profile.base, profile.max_position_size, wallet)
    }

    /// Pull a stored record back into range. Loaded agents skip `new`.
    pub fn sanitized(mut self) -> Self {
        self.params = self.params.clamped();
        self.max_position_size = if self.max_position_size.is_finite() {
            self.max_position_size.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let outlook = self.outlook;
        self.set_outlook(outlook);
        self
    }

    pub fn set_outlook(&mut self, outlook: f64) {
        self.outlook = if outlook.is_finite() {
            outlook.clamp(-1.0, 1.0)
        } else {
            0.0
        };
    }

    pub fn portfolio_value(&self, price: f64) -> f64 {
        self.wallet.value_in_sol(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_carries_personality_and_id() {
        let a = Agent::with_profile(7, PersonalityType::Contrarian, Wallet::new(1.0, 0.0));
        assert_eq!(a.name, "Contrarian-007");
        assert!(a.active);
        assert_eq!(a.last_selected_tick, None);
    }

    #[test]
    fn outlook_is_clamped() {
        let mut a = Agent::with_profile(1, PersonalityType::Balanced, Wallet::default());
        a.set_outlook(3.0);
        assert_eq!(a.outlook, 1.0);
        a.set_outlook(f64::NAN);
        assert_eq!(a.outlook, 0.0);
    }

    #[test]
    fn position_size_capped_at_one() {
        let p = PersonalityType::Aggressive.profile();
        let a = Agent::new(2, PersonalityType::Aggressive, p.base, 4.0, Wallet::default());
        assert_eq!(a.max_position_size, 1.0);
    }

    #[test]
    fn sanitized_pulls_stored_values_into_range() {
        // Arrange: a record as it might come back from a hand-edited snapshot
        let mut a = Agent::with_profile(3, PersonalityType::Contrarian, Wallet::default());
        a.params.contrary_opinion_rate = 1.5;
        a.params.trade_frequency = f64::NAN;
        a.max_position_size = -2.0;
        a.outlook = 7.0;

        // Act
        let a = a.sanitized();

        // Assert
        assert_eq!(a.params.contrary_opinion_rate, 1.0);
        assert_eq!(a.params.trade_frequency, 0.0);
        assert_eq!(a.max_position_size, 0.0);
        assert_eq!(a.outlook, 1.0);
    }
}
