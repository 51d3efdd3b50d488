// src/analysis/mod.rs

pub mod momentum;

pub use momentum::{MarketSignal, MomentumEstimator};
