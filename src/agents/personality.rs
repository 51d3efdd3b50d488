// src/agents/personality.rs

use rand::Rng;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::config::{
    AGGRESSIVE_PROFILE, BALANCED_PROFILE, CAUTIOUS_PROFILE, CONTRARIAN_PROFILE,
    TREND_FOLLOWER_PROFILE,
};
use crate::error::{Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityType {
    Cautious,
    Balanced,
    Aggressive,
    TrendFollower,
    Contrarian,
}

impl PersonalityType {
    pub const ALL: [PersonalityType; 5] = [
        PersonalityType::Cautious,
        PersonalityType::Balanced,
        PersonalityType::Aggressive,
        PersonalityType::TrendFollower,
        PersonalityType::Contrarian,
    ];

    pub fn profile(self) -> PersonalityProfile {
        match self {
            PersonalityType::Cautious => CAUTIOUS_PROFILE,
            PersonalityType::Balanced => BALANCED_PROFILE,
            PersonalityType::Aggressive => AGGRESSIVE_PROFILE,
            PersonalityType::TrendFollower => TREND_FOLLOWER_PROFILE,
            PersonalityType::Contrarian => CONTRARIAN_PROFILE,
        }
    }
}

impl fmt::Display for PersonalityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PersonalityType::Cautious => "Cautious",
            PersonalityType::Balanced => "Balanced",
            PersonalityType::Aggressive => "Aggressive",
            PersonalityType::TrendFollower => "TrendFollower",
            PersonalityType::Contrarian => "Contrarian",
        };
        f.write_str(s)
    }
}

/// Behaviour knobs, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorParams {
    pub risk_tolerance: f64,
    pub trade_frequency: f64,
    pub social_influence: f64,
    pub emotional_volatility: f64,
    pub contrary_opinion_rate: f64,
    pub technical_language_level: f64,
    pub message_frequency: f64,
}

impl BehaviorParams {
    fn map(self, mut f: impl FnMut(f64) -> f64) -> Self {
        Self {
            risk_tolerance: f(self.risk_tolerance),
            trade_frequency: f(self.trade_frequency),
            social_influence: f(self.social_influence),
            emotional_volatility: f(self.emotional_volatility),
            contrary_opinion_rate: f(self.contrary_opinion_rate),
            technical_language_level: f(self.technical_language_level),
            message_frequency: f(self.message_frequency),
        }
    }

    pub fn clamped(self) -> Self {
        self.map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
    }

    /// Every field moved by a uniform draw in `[-amount, amount]`, then clamped.
    pub fn jittered<R: Rng + ?Sized>(self, rng: &mut R, amount: f64) -> Self {
        if amount <= 0.0 {
            return self.clamped();
        }
        self.map(|v| v + rng.gen_range(-amount..=amount)).clamped()
    }
}

/// Defaults for one personality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersonalityProfile {
    pub base: BehaviorParams,
    /// Fraction of a balance one trade may use.
    pub max_position_size: f64,
    /// Constant lean added to every outlook.
    pub outlook_bias: f64,
    /// Multiplier on observed momentum.
    pub momentum_gain: f64,
}

/// Relative weights for seeding a population. Missing entries weigh zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalityDistribution(pub BTreeMap<PersonalityType, f64>);

impl Default for PersonalityDistribution {
    fn default() -> Self {
        Self(BTreeMap::from([
            (PersonalityType::Cautious, 0.2),
            (PersonalityType::Balanced, 0.3),
            (PersonalityType::Aggressive, 0.15),
            (PersonalityType::TrendFollower, 0.2),
            (PersonalityType::Contrarian, 0.15),
        ]))
    }
}

impl PersonalityDistribution {
    /// Everyone gets the same personality.
    pub fn only(personality: PersonalityType) -> Self {
        Self(BTreeMap::from([(personality, 1.0)]))
    }

    pub fn weight(&self, personality: PersonalityType) -> f64 {
        self.0.get(&personality).copied().unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some((p, w)) = self.0.iter().find(|(_, w)| !(w.is_finite() && **w >= 0.0)) {
            return Err(SimError::InvalidConfiguration(format!(
                "weight for {p} must be a non-negative number, got {w}"
            )));
        }
        if self.0.values().sum::<f64>() <= 0.0 {
            return Err(SimError::InvalidConfiguration(
                "personality distribution has no positive weight".into(),
            ));
        }
        Ok(())
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PersonalityType> {
        let (kinds, weights): (Vec<PersonalityType>, Vec<f64>) =
            self.0.iter().map(|(k, w)| (*k, *w)).unzip();
        let index = WeightedIndex::new(&weights)
            .map_err(|e| SimError::InvalidConfiguration(format!("bad distribution: {e}")))?;
        Ok(kinds[index.sample(rng)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn every_profile_is_in_range() {
        for p in PersonalityType::ALL {
            let prof = p.profile();
            assert_eq!(prof.base, prof.base.clamped(), "{p} has an out-of-range param");
            assert!(prof.max_position_size > 0.0 && prof.max_position_size <= 1.0);
        }
    }

    #[test]
    fn jitter_never_leaves_unit_interval() {
        let mut rng = StdRng::seed_from_u64(3);
        let base = PersonalityType::Aggressive.profile().base;
        for _ in 0..500 {
            let j = base.jittered(&mut rng, 0.5);
            assert_eq!(j, j.clamped());
        }
    }

    #[test]
    fn default_distribution_is_valid_and_samples_everyone() {
        let dist = PersonalityDistribution::default();
        dist.validate().unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(dist.sample(&mut rng).unwrap());
        }
        assert_eq!(seen.len(), PersonalityType::ALL.len());
    }

    #[test]
    fn zero_or_negative_weights_are_invalid() {
        let empty = PersonalityDistribution(BTreeMap::new());
        assert!(empty.validate().is_err());

        let mut w = BTreeMap::new();
        w.insert(PersonalityType::Cautious, -1.0);
        w.insert(PersonalityType::Balanced, 2.0);
        assert!(PersonalityDistribution(w).validate().is_err());
    }

    #[test]
    fn single_personality_always_sampled() {
        let dist = PersonalityDistribution::only(PersonalityType::Contrarian);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            assert_eq!(dist.sample(&mut rng).unwrap(), PersonalityType::Contrarian);
        }
    }

    #[test]
    fn distribution_json_is_a_plain_map() {
        let dist = PersonalityDistribution::only(PersonalityType::TrendFollower);
        let json = serde_json::to_string(&dist).unwrap();
        assert_eq!(json, r#"{"trend_follower":1.0}"#);
    }
}
