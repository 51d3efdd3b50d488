// src/sentiment.rs

//! Rolling crowd mood built from classified chat messages.

pub mod classifier;
pub mod engine;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::SentimentLabel;

/// Shares of recent chat by label. Always sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub bullish: f64,
    pub bearish: f64,
    pub neutral: f64,
}

impl Default for SentimentBreakdown {
    fn default() -> Self {
        Self {
            bullish: 0.0,
            bearish: 0.0,
            neutral: 1.0,
        }
    }
}

impl SentimentBreakdown {
    /// Bullish minus bearish, in [-1, 1].
    pub fn score(&self) -> f64 {
        self.bullish - self.bearish
    }

    pub fn dominant(&self) -> SentimentLabel {
        if self.bullish > self.bearish && self.bullish > self.neutral {
            SentimentLabel::Positive
        } else if self.bearish > self.bullish && self.bearish > self.neutral {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// Per-message smoothing for a given half-life in messages.
/// At `half_life` messages later an observation weighs 0.5.
pub fn ewma_alpha(half_life_messages: f64) -> f64 {
    1.0 - 2f64.powf(-1.0 / half_life_messages)
}

/// Exponentially weighted label shares. One writer, many readers.
pub struct SentimentAggregate {
    alpha: f64,
    state: RwLock<SentimentBreakdown>,
    observed: AtomicU64,
}

impl SentimentAggregate {
    pub fn new(half_life_messages: f64) -> Self {
        Self {
            alpha: ewma_alpha(half_life_messages.max(f64::MIN_POSITIVE)),
            state: RwLock::new(SentimentBreakdown::default()),
            observed: AtomicU64::new(0),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn record(&self, label: SentimentLabel) {
        let hit = |l: SentimentLabel| if l == label { 1.0 } else { 0.0 };
        let a = self.alpha;
        let mut s = self.state.write();
        s.bullish = (1.0 - a) * s.bullish + a * hit(SentimentLabel::Positive);
        s.bearish = (1.0 - a) * s.bearish + a * hit(SentimentLabel::Negative);
        s.neutral = (1.0 - a) * s.neutral + a * hit(SentimentLabel::Neutral);
        self.observed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy of the current shares.
    pub fn snapshot(&self) -> SentimentBreakdown {
        *self.state.read()
    }

    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        *self.state.write() = SentimentBreakdown::default();
        self.observed.store(0, Ordering::Relaxed);
    }
}
