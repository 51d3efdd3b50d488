// src/engine/phase.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    MarketAnalysis,
    Social,
    Trade,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::MarketAnalysis => Phase::Social,
            Phase::Social => Phase::Trade,
            Phase::Trade => Phase::MarketAnalysis,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::MarketAnalysis => write!(f, "MARKET_ANALYSIS"),
            Phase::Social => write!(f, "SOCIAL"),
            Phase::Trade => write!(f, "TRADE"),
        }
    }
}

/// Tracks the current phase and how far through it we are.
///
/// Progress is kept as a fraction so that pausing and speed changes preserve
/// it exactly: only the wall-clock length of what is left changes.
#[derive(Debug, Clone)]
pub struct PhaseClock {
    phase: Phase,
    phase_len: Duration,
    /// Progress banked before the current running segment.
    banked: f64,
    segment_start: Instant,
    paused: bool,
}

impl PhaseClock {
    /// A running clock at the start of `MarketAnalysis`.
    pub fn new(phase_len: Duration) -> Self {
        Self {
            phase: Phase::MarketAnalysis,
            phase_len: nonzero(phase_len),
            banked: 0.0,
            segment_start: Instant::now(),
            paused: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn phase_len(&self) -> Duration {
        self.phase_len
    }

    /// Fraction of the current phase elapsed, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.paused {
            return self.banked;
        }
        let run = self.segment_start.elapsed().as_secs_f64() / self.phase_len.as_secs_f64();
        (self.banked + run).min(1.0)
    }

    /// Wall-clock time until the phase elapses at the current speed.
    pub fn remaining(&self) -> Duration {
        self.phase_len.mul_f64(1.0 - self.progress())
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.banked = self.progress();
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.segment_start = Instant::now();
            self.paused = false;
        }
    }

    /// Change the phase length, keeping the elapsed fraction.
    pub fn rescale(&mut self, phase_len: Duration) {
        self.banked = self.progress();
        self.segment_start = Instant::now();
        self.phase_len = nonzero(phase_len);
    }

    /// Pin the phase at its end so the next check runs its tick at once.
    pub fn hold_at_end(&mut self) {
        self.banked = 1.0;
        self.segment_start = Instant::now();
    }

    /// Move to the next phase with zero progress.
    pub fn advance(&mut self) -> Phase {
        self.phase = self.phase.next();
        self.banked = 0.0;
        self.segment_start = Instant::now();
        self.phase
    }

    /// Jump to a stored position, e.g. from a checkpoint.
    pub fn restore(&mut self, phase: Phase, progress: f64) {
        self.phase = phase;
        self.banked = progress.clamp(0.0, 1.0);
        self.segment_start = Instant::now();
    }
}

fn nonzero(d: Duration) -> Duration {
    d.max(Duration::from_millis(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_cycle_in_order() {
        assert_eq!(Phase::MarketAnalysis.next(), Phase::Social);
        assert_eq!(Phase::Social.next(), Phase::Trade);
        assert_eq!(Phase::Trade.next(), Phase::MarketAnalysis);
        assert_eq!(Phase::Trade.to_string(), "TRADE");
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_progress() {
        // Arrange
        let mut clock = PhaseClock::new(Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(4)).await;

        // Act
        clock.pause();
        tokio::time::advance(Duration::from_secs(30)).await;

        // Assert
        assert!((clock.progress() - 0.4).abs() < 1e-9);
        clock.resume();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!((clock.progress() - 0.5).abs() < 1e-9);
        assert_eq!(clock.phase(), Phase::MarketAnalysis);
    }

    #[tokio::test(start_paused = true)]
    async fn rescale_keeps_fraction_and_shrinks_remaining() {
        let mut clock = PhaseClock::new(Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(5)).await;

        // Double speed: half the phase length.
        clock.rescale(Duration::from_secs(5));

        assert!((clock.progress() - 0.5).abs() < 1e-9);
        assert_eq!(clock.remaining(), Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_saturates_and_advance_resets() {
        let mut clock = PhaseClock::new(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(clock.progress(), 1.0);
        assert_eq!(clock.remaining(), Duration::ZERO);

        assert_eq!(clock.advance(), Phase::Social);
        assert_eq!(clock.progress(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn hold_at_end_survives_pause() {
        let mut clock = PhaseClock::new(Duration::from_secs(2));
        clock.hold_at_end();
        clock.pause();
        clock.resume();
        assert_eq!(clock.progress(), 1.0);
        assert_eq!(clock.phase(), Phase::MarketAnalysis);
    }
}
