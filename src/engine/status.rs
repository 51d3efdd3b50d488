// src/engine/status.rs

use serde::{Deserialize, Serialize};

use super::phase::Phase;
use crate::agents::pool::TickResult;
use crate::config::SimConfig;
use crate::sentiment::SentimentBreakdown;
use crate::types::{RunId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Ready,
    Running,
    Paused,
    Stopped,
}

impl RunStatus {
    /// Running or paused.
    pub fn is_live(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }
}

/// Totals across every tick of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Counters {
    pub ticks: u64,
    pub agents_selected: u64,
    pub decisions: u64,
    pub trades: u64,
    pub messages: u64,
    pub reactions: u64,
    pub errors: u64,
    pub cancelled: u64,
}

impl Counters {
    pub fn absorb(&mut self, tick: &TickResult) {
        self.ticks += 1;
        self.agents_selected += tick.agents_selected as u64;
        self.decisions += tick.decisions_made as u64;
        self.trades += tick.trades_executed as u64;
        self.messages += tick.messages_posted as u64;
        self.reactions += tick.reactions as u64;
        self.errors += tick.errors as u64;
        self.cancelled += tick.cancelled as u64;
    }
}

/// One simulation session. Superseded runs are archived, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRun {
    pub id: RunId,
    pub status: RunStatus,
    pub phase: Phase,
    pub config: SimConfig,
    pub started_at: Option<Timestamp>,
    pub paused_at: Option<Timestamp>,
    pub stopped_at: Option<Timestamp>,
    pub archived: bool,
}

/// Where the driver was after its last completed tick. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub run_id: RunId,
    pub phase: Phase,
    pub tick: u64,
    pub counters: Counters,
    pub saved_at: Timestamp,
}

/// What observers read. Lives in memory; never loaded from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub run_id: Option<RunId>,
    pub status: RunStatus,
    pub phase: Phase,
    /// Fraction of the current phase elapsed.
    pub phase_progress: f64,
    pub tick: u64,
    pub speed_multiplier: f64,
    pub counters: Counters,
    pub price: f64,
    pub sentiment: SentimentBreakdown,
    pub active_agents: usize,
    pub amm_halted: bool,
    pub last_tick: Option<TickResult>,
    pub updated_at: Timestamp,
}
