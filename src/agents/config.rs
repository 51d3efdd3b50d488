// src/agents/config.rs

//! A centralized place for tuning agent behavior parameters.

use super::personality::{BehaviorParams, PersonalityProfile};

// --- Trading ---
/// Trades worth less than this (in SOL) are skipped.
pub const MIN_TRADE_SOL: f64 = 0.001;
/// Cap on the share of a balance one trade may use, scaled by risk tolerance.
pub const MAX_RISK_FRACTION: f64 = 0.25;

// --- Market analysis ---
/// Bars of price history fed to the momentum estimator.
pub const MOMENTUM_WINDOW: usize = 20;
/// Share of the previous outlook carried into the next one.
pub const OUTLOOK_MEMORY: f64 = 0.3;
/// Weight of the sentiment score, before social influence scaling.
pub const SENTIMENT_WEIGHT: f64 = 0.5;
/// Std-dev of outlook noise for a perfectly calm agent.
pub const OUTLOOK_JITTER_BASE: f64 = 0.05;
/// Extra noise per unit of emotional volatility.
pub const OUTLOOK_JITTER_VOL: f64 = 0.35;
/// Trend followers scale momentum by this.
pub const TREND_FOLLOWER_GAIN: f64 = 1.5;

// --- Social ---
pub const MAX_REACTIONS_PER_TICK: usize = 3;
/// How far back agents look for something to react to.
pub const REACTION_LOOKBACK: usize = 10;
pub const LABEL_JITTER_BASE: f64 = 0.1;
pub const LABEL_JITTER_VOL: f64 = 0.4;

// --- Seeding ---
/// Each behaviour parameter is nudged by up to this much at creation.
pub const PARAM_JITTER: f64 = 0.1;

// --- Personality profiles ---
// Cautious agents trade rarely and small, and mostly listen.
pub const CAUTIOUS_PROFILE: PersonalityProfile = PersonalityProfile {
    base: BehaviorParams {
        risk_tolerance: 0.2,
        trade_frequency: 0.2,
        social_influence: 0.3,
        emotional_volatility: 0.2,
        contrary_opinion_rate: 0.1,
        technical_language_level: 0.4,
        message_frequency: 0.2,
    },
    max_position_size: 0.1,
    outlook_bias: -0.1,
    momentum_gain: 0.6,
};

pub const BALANCED_PROFILE: PersonalityProfile = PersonalityProfile {
    base: BehaviorParams {
        risk_tolerance: 0.5,
        trade_frequency: 0.4,
        social_influence: 0.5,
        emotional_volatility: 0.4,
        contrary_opinion_rate: 0.2,
        technical_language_level: 0.5,
        message_frequency: 0.4,
    },
    max_position_size: 0.2,
    outlook_bias: 0.0,
    momentum_gain: 1.0,
};

pub const AGGRESSIVE_PROFILE: PersonalityProfile = PersonalityProfile {
    base: BehaviorParams {
        risk_tolerance: 0.9,
        trade_frequency: 0.7,
        social_influence: 0.4,
        emotional_volatility: 0.7,
        contrary_opinion_rate: 0.2,
        technical_language_level: 0.3,
        message_frequency: 0.6,
    },
    max_position_size: 0.4,
    outlook_bias: 0.15,
    momentum_gain: 1.2,
};

pub const TREND_FOLLOWER_PROFILE: PersonalityProfile = PersonalityProfile {
    base: BehaviorParams {
        risk_tolerance: 0.6,
        trade_frequency: 0.5,
        social_influence: 0.7,
        emotional_volatility: 0.5,
        contrary_opinion_rate: 0.05,
        technical_language_level: 0.6,
        message_frequency: 0.5,
    },
    max_position_size: 0.25,
    outlook_bias: 0.05,
    momentum_gain: TREND_FOLLOWER_GAIN,
};

// Contrarians fade the crowd; contrary_opinion_rate drives the flip.
pub const CONTRARIAN_PROFILE: PersonalityProfile = PersonalityProfile {
    base: BehaviorParams {
        risk_tolerance: 0.6,
        trade_frequency: 0.4,
        social_influence: 0.2,
        emotional_volatility: 0.4,
        contrary_opinion_rate: 0.7,
        technical_language_level: 0.7,
        message_frequency: 0.4,
    },
    max_position_size: 0.25,
    outlook_bias: 0.0,
    momentum_gain: 1.0,
};
