// src/lib.rs

// === 1. Declare all the top-level modules ===
pub mod agents;
pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod logging;
pub mod sentiment;
pub mod simulators;
pub mod token;
pub mod types;

// === 2. Re-export the public-facing components to create a clean API ===

// --- From `agents` ---
pub use agents::agent::Agent;
pub use agents::decision::{Decision, MarketContext};
pub use agents::personality::{BehaviorParams, PersonalityDistribution, PersonalityType};
pub use agents::pool::{AgentPool, CancelToken, TickResult};

// --- From the `engine` ---
pub use engine::{
    Collaborators, ControlCommand, ControlResponse, Phase, RunStatus, SimulationEngine,
    StatusSnapshot,
};

// --- From `simulators` ---
pub use simulators::amm::{MarketMaker, SwapQuote, SwapRejected};
pub use simulators::gbm::GBMSimulator;
pub use simulators::market_trait::Marketable;
pub use simulators::pool_state::PoolState;

// --- From `sentiment` ---
pub use sentiment::SentimentBreakdown;
pub use sentiment::engine::MessagingEngine;

// --- Config, errors and shared types ---
pub use config::{ConfigPatch, ExternalCallPolicy, MarketConfig, SimConfig};
pub use error::{Result, SimError};
pub use token::TokenInfo;
pub use types::{Direction, Message, Transaction, Wallet};
