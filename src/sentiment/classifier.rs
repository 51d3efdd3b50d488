// src/sentiment/classifier.rs

use crate::types::SentimentLabel;

const BULLISH_WORDS: &[&str] = &[
    "moon", "mooning", "pump", "pumping", "bullish", "buy", "buying", "long", "ape", "rocket",
    "gem", "rally", "breakout", "green", "hodl", "up", "higher", "strong", "accumulate", "rip",
];

const BEARISH_WORDS: &[&str] = &[
    "dump", "dumping", "bearish", "sell", "selling", "short", "rug", "crash", "scam", "red",
    "down", "lower", "weak", "exit", "rekt", "bleed", "bleeding", "overvalued", "careful", "fade",
];

/// Keyword score in [-1, 1] and the label it maps to.
pub fn classify(text: &str) -> (SentimentLabel, f64) {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let positive = words.iter().filter(|w| BULLISH_WORDS.contains(*w)).count() as i32;
    let negative = words.iter().filter(|w| BEARISH_WORDS.contains(*w)).count() as i32;

    let total = (positive + negative).max(1) as f64;
    let score = ((positive - negative) as f64 / total).clamp(-1.0, 1.0);
    (SentimentLabel::from_score(score), score)
}

pub fn classify_label(text: &str) -> SentimentLabel {
    classify(text).0
}
