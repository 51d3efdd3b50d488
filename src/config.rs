// src/config.rs

//! Run configuration: defaults, validation, JSON file and `AMS_*` env overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::agents::personality::PersonalityDistribution;
use crate::error::{Result, SimError};
use crate::token::{TokenInfo, default_token};

/// Largest accepted speed multiplier.
pub const MAX_SPEED_MULTIPLIER: f64 = 10.0;

/// Pool economics. One copy is shared by bootstrap and the swap path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketConfig {
    /// Fraction of every swap input kept by the pool.
    pub fee_rate: f64,
    /// Slippage tolerance agents attach to their swaps.
    pub default_slippage: f64,
    /// SOL per token at bootstrap when the oracle has nothing.
    pub initial_price: f64,
    /// SOL side of the pool at bootstrap.
    pub initial_liquidity_sol: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            fee_rate: 0.003,
            default_slippage: 0.005,
            initial_price: 0.001,
            initial_liquidity_sol: 10_000.0,
        }
    }
}

/// Deadline and retry budget for every call leaving the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalCallPolicy {
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
}

impl Default for ExternalCallPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            retries: 1,
            backoff_ms: 100,
        }
    }
}

impl ExternalCallPolicy {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    /// Exponential backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> std::time::Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        std::time::Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimConfig {
    pub agent_count: usize,
    pub phase_duration_ms: u64,
    pub speed_multiplier: f64,
    pub max_agents_per_phase: usize,
    pub max_concurrent: usize,
    pub personality_distribution: PersonalityDistribution,
    /// How long a tick waits for slow decisions before aborting them.
    pub straggler_timeout_ms: u64,
    /// Messages after which an old message weighs half in the aggregate.
    pub sentiment_half_life_messages: f64,
    pub starting_sol_min: f64,
    pub starting_sol_max: f64,
    /// Upper bound of each agent's initial token holding, valued in SOL.
    pub starting_token_value_sol: f64,
    pub seed: Option<u64>,
    pub token: TokenInfo,
    pub market: MarketConfig,
    pub external: ExternalCallPolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            agent_count: 50,
            phase_duration_ms: 5_000,
            speed_multiplier: 1.0,
            max_agents_per_phase: 20,
            max_concurrent: 5,
            personality_distribution: PersonalityDistribution::default(),
            straggler_timeout_ms: 10_000,
            sentiment_half_life_messages: 10.0,
            starting_sol_min: 5.0,
            starting_sol_max: 50.0,
            starting_token_value_sol: 10.0,
            seed: None,
            token: default_token(),
            market: MarketConfig::default(),
            external: ExternalCallPolicy::default(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> SimError {
    SimError::InvalidConfiguration(msg.into())
}

fn check_fraction(name: &str, v: f64, allow_zero: bool) -> Result<()> {
    let ok = if allow_zero { (0.0..1.0).contains(&v) } else { v > 0.0 && v <= 1.0 };
    if ok && v.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("{name} out of range: {v}")))
    }
}

/// Speed multipliers live in (0, 10].
pub fn validate_speed(multiplier: f64) -> Result<()> {
    if multiplier.is_finite() && multiplier > 0.0 && multiplier <= MAX_SPEED_MULTIPLIER {
        Ok(())
    } else {
        Err(invalid(format!(
            "speed multiplier must be in (0, {MAX_SPEED_MULTIPLIER}], got {multiplier}"
        )))
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent_count == 0 {
            return Err(invalid("agentCount must be positive"));
        }
        if self.phase_duration_ms == 0 {
            return Err(invalid("phaseDurationMs must be positive"));
        }
        validate_speed(self.speed_multiplier)?;
        if self.max_agents_per_phase == 0 {
            return Err(invalid("maxAgentsPerPhase must be positive"));
        }
        if self.max_concurrent == 0 {
            return Err(invalid("maxConcurrent must be positive"));
        }
        if self.straggler_timeout_ms == 0 {
            return Err(invalid("stragglerTimeoutMs must be positive"));
        }
        if !(self.sentiment_half_life_messages > 0.0) {
            return Err(invalid("sentimentHalfLifeMessages must be positive"));
        }
        if !(self.starting_sol_min >= 0.0 && self.starting_sol_max >= self.starting_sol_min) {
            return Err(invalid("starting SOL range is empty or negative"));
        }
        if !(self.starting_token_value_sol >= 0.0) {
            return Err(invalid("startingTokenValueSol must be non-negative"));
        }
        self.personality_distribution.validate()?;

        let m = &self.market;
        check_fraction("market.feeRate", m.fee_rate, true)?;
        check_fraction("market.defaultSlippage", m.default_slippage, false)?;
        if !(m.initial_price > 0.0 && m.initial_price.is_finite()) {
            return Err(invalid("market.initialPrice must be positive"));
        }
        if !(m.initial_liquidity_sol > 0.0 && m.initial_liquidity_sol.is_finite()) {
            return Err(invalid("market.initialLiquiditySol must be positive"));
        }
        let pool_tokens = m.initial_liquidity_sol / m.initial_price;
        if pool_tokens > self.token.total_supply {
            return Err(invalid(format!(
                "pool needs {pool_tokens:.0} {} but supply is {:.0}",
                self.token.symbol, self.token.total_supply
            )));
        }
        if self.external.timeout_ms == 0 {
            return Err(invalid("external.timeoutMs must be positive"));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: SimConfig = serde_json::from_str(json)
            .map_err(|e| invalid(format!("cannot parse config: {e}")))?;
        Ok(cfg)
    }

    /// Missing fields fall back to defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            invalid(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Apply `AMS_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Same as `apply_env` but with an injectable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> Result<T> {
            raw.trim()
                .parse::<T>()
                .map_err(|_| invalid(format!("{key}={raw} is not a valid value")))
        }

        if let Some(v) = lookup("AMS_AGENT_COUNT") {
            self.agent_count = parse("AMS_AGENT_COUNT", v)?;
        }
        if let Some(v) = lookup("AMS_PHASE_DURATION_MS") {
            self.phase_duration_ms = parse("AMS_PHASE_DURATION_MS", v)?;
        }
        if let Some(v) = lookup("AMS_SPEED") {
            self.speed_multiplier = parse("AMS_SPEED", v)?;
        }
        if let Some(v) = lookup("AMS_MAX_AGENTS_PER_PHASE") {
            self.max_agents_per_phase = parse("AMS_MAX_AGENTS_PER_PHASE", v)?;
        }
        if let Some(v) = lookup("AMS_MAX_CONCURRENT") {
            self.max_concurrent = parse("AMS_MAX_CONCURRENT", v)?;
        }
        if let Some(v) = lookup("AMS_SEED") {
            self.seed = Some(parse("AMS_SEED", v)?);
        }
        if let Some(v) = lookup("AMS_FEE_RATE") {
            self.market.fee_rate = parse("AMS_FEE_RATE", v)?;
        }
        if let Some(v) = lookup("AMS_DEFAULT_SLIPPAGE") {
            self.market.default_slippage = parse("AMS_DEFAULT_SLIPPAGE", v)?;
        }
        Ok(())
    }

    /// Effective wall-clock length of one phase at the current speed.
    pub fn scaled_phase_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(
            self.phase_duration_ms as f64 / 1_000.0 / self.speed_multiplier,
        )
    }
}

/// Partial update accepted by the `configure` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub max_agents_per_phase: Option<usize>,
    pub max_concurrent: Option<usize>,
    pub phase_duration_ms: Option<u64>,
    pub personality_distribution: Option<PersonalityDistribution>,
    pub default_slippage: Option<f64>,
    pub straggler_timeout_ms: Option<u64>,
}

impl ConfigPatch {
    /// Returns the patched copy; `base` is untouched when validation fails.
    pub fn apply_to(&self, base: &SimConfig) -> Result<SimConfig> {
        let mut next = base.clone();
        if let Some(v) = self.max_agents_per_phase {
            next.max_agents_per_phase = v;
        }
        if let Some(v) = self.max_concurrent {
            next.max_concurrent = v;
        }
        if let Some(v) = self.phase_duration_ms {
            next.phase_duration_ms = v;
        }
        if let Some(d) = &self.personality_distribution {
            next.personality_distribution = d.clone();
        }
        if let Some(v) = self.default_slippage {
            next.market.default_slippage = v;
        }
        if let Some(v) = self.straggler_timeout_ms {
            next.straggler_timeout_ms = v;
        }
        next.validate()?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn speed_bounds() {
        assert!(validate_speed(10.0).is_ok());
        assert!(validate_speed(0.1).is_ok());
        assert!(matches!(
            validate_speed(0.0),
            Err(SimError::InvalidConfiguration(_))
        ));
        assert!(validate_speed(10.01).is_err());
        assert!(validate_speed(f64::NAN).is_err());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut cfg = SimConfig::default();
        cfg.max_concurrent = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SimConfig::default();
        cfg.agent_count = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn pool_cannot_exceed_token_supply() {
        let mut cfg = SimConfig::default();
        cfg.market.initial_price = 1e-12;
        assert!(matches!(
            cfg.validate(),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn json_uses_camel_case_and_defaults() {
        let cfg = SimConfig::from_json_str(
            r#"{ "agentCount": 12, "speedMultiplier": 2.5, "market": { "feeRate": 0.005 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.agent_count, 12);
        assert_eq!(cfg.speed_multiplier, 2.5);
        assert_eq!(cfg.market.fee_rate, 0.005);
        // untouched fields keep their defaults
        assert_eq!(cfg.max_concurrent, 5);
        assert_eq!(cfg.market.default_slippage, 0.005);
    }

    #[test]
    fn env_overrides_apply_and_reject_garbage() {
        let env: HashMap<&str, &str> =
            [("AMS_AGENT_COUNT", "7"), ("AMS_SEED", "42")].into_iter().collect();
        let mut cfg = SimConfig::default();
        cfg.apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.agent_count, 7);
        assert_eq!(cfg.seed, Some(42));

        let mut cfg = SimConfig::default();
        let err = cfg
            .apply_env_from(|k| (k == "AMS_SPEED").then(|| "fast".to_string()))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidConfiguration(_)));
    }

    #[test]
    fn patch_validates_before_applying() {
        let base = SimConfig::default();
        let bad = ConfigPatch {
            max_concurrent: Some(0),
            ..Default::default()
        };
        assert!(bad.apply_to(&base).is_err());

        let good = ConfigPatch {
            max_agents_per_phase: Some(8),
            ..Default::default()
        };
        let next = good.apply_to(&base).unwrap();
        assert_eq!(next.max_agents_per_phase, 8);
        assert_eq!(base.max_agents_per_phase, 20);
    }

    #[test]
    fn scaled_duration_follows_speed() {
        let mut cfg = SimConfig::default();
        cfg.phase_duration_ms = 4_000;
        cfg.speed_multiplier = 2.0;
        assert_eq!(cfg.scaled_phase_duration(), std::time::Duration::from_secs(2));
    }
}
