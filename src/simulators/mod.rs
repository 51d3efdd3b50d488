// src/simulators/mod.rs

pub mod amm;
pub mod gbm;
pub mod market_trait;
pub mod pool_state;
