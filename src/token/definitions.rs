// src/token/definitions.rs
//! Metadata of the single token traded against SOL.

use serde::{Deserialize, Serialize};

/// Asset id the price oracle uses for the quote asset.
pub const SOL_ASSET_ID: &str = "SOL";

/// Immutable facts about the listed token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    /// Short ticker (e.g. "SIM"), also used as the oracle asset id.
    pub symbol: String,
    /// Human-readable name.
    pub name: String,
    /// Nominal supply. Config validation keeps the bootstrap pool within it;
    /// agent grants and re-bootstraps are not counted against it.
    pub total_supply: f64,
}

impl TokenInfo {
    #[inline]
    pub fn new<T1: Into<String>, T2: Into<String>>(symbol: T1, name: T2, total_supply: f64) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            total_supply,
        }
    }

    /// Ticker with the chat-style `$` prefix used in generated messages.
    pub fn cashtag(&self) -> String {
        format!("${}", self.symbol)
    }
}

impl Default for TokenInfo {
    fn default() -> Self {
        default_token()
    }
}

/// The token the market boots with.
#[inline]
pub fn default_token() -> TokenInfo {
    TokenInfo::new("SIM", "Simulated Agent Token", 1_000_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_token_has_supply() {
        let t = default_token();
        assert_eq!(t.symbol, "SIM");
        assert!(t.total_supply > 0.0);
        assert_eq!(t.cashtag(), "$SIM");
    }
}
