// src/error.rs

//! Crate-wide error type.

/// Every failure the simulator can report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    // ── Market maker ─────────────────────────────────────────────────────────
    /// The swap would drain the output reserve to zero or below the floor.
    #[error("insufficient liquidity: output {requested:.6} vs reserve {available:.6}")]
    InsufficientLiquidity { requested: f64, available: f64 },

    /// Price impact of the swap is larger than the caller accepts.
    #[error("slippage exceeded: impact {impact:.4} > max {max:.4}")]
    SlippageExceeded { impact: f64, max: f64 },

    /// The wallet cannot cover the requested amount.
    #[error("insufficient balance: needed {needed:.6}, available {available:.6}")]
    InsufficientBalance { needed: f64, available: f64 },

    /// Fatal: reserves no longer satisfy x * y = k. The AMM halts until reset.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    // ── Control surface ──────────────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("a simulation run is already active")]
    AlreadyRunning,

    #[error("no simulation run is active")]
    NotRunning,

    // ── Collaborators ────────────────────────────────────────────────────────
    /// An external call did not finish before its deadline.
    #[error("external call timed out: {0}")]
    ExternalTimeout(String),

    /// An external call returned an error.
    #[error("external call failed: {0}")]
    External(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl SimError {
    /// Only invariant violations are allowed to stop the market.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimError::InvariantViolation(_))
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::Persistence(e.to_string())
    }
}

impl From<std::io::Error> for SimError {
    fn from(e: std::io::Error) -> Self {
        SimError::Persistence(e.to_string())
    }
}

/// Convenience alias so every module can write `Result<T>`.
pub type Result<T> = std::result::Result<T, SimError>;
