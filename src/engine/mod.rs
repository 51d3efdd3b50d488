// src/engine/mod.rs

pub mod control;
pub mod phase;
pub mod simulation;
pub mod status;

pub use control::{ControlCommand, ControlResponse, handle_command, handle_line};
pub use phase::{Phase, PhaseClock};
pub use simulation::{Collaborators, SimulationEngine};
pub use status::{Checkpoint, Counters, RunStatus, SimulationRun, StatusSnapshot};
