// src/simulators/market_trait.rs

/// Anything that can be asked for a token price in SOL.
/// Lets analysis code read the AMM and the reference random walk alike.
pub trait Marketable {
    /// Latest price without advancing anything.
    fn current_price(&self) -> f64;

    /// Up to `n` most recent prices, oldest first.
    fn recent_prices(&self, n: usize) -> Vec<f64>;
}
