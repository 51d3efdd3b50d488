// src/engine/control.rs

//! Command surface: one JSON command in, one `ControlResponse` out.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::simulation::SimulationEngine;
use crate::config::{ConfigPatch, SimConfig};
use crate::external::store::PageRequest;

/// `{"action": "setSpeed", "multiplier": 2.0}` and friends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlCommand {
    /// Start a run. Without a config the engine's current one is reused.
    Start {
        #[serde(default)]
        config: Option<SimConfig>,
    },
    Stop,
    Pause,
    Resume,
    SetSpeed {
        multiplier: f64,
    },
    Configure {
        patch: ConfigPatch,
    },
    Status,
    PoolState,
    Transactions {
        #[serde(default)]
        offset: usize,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    Messages {
        #[serde(default)]
        offset: usize,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    Agents,
}

fn default_limit() -> usize {
    PageRequest::default().limit
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

fn to_data<T: Serialize>(value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "response payload not serializable");
            None
        }
    }
}

fn outcome<T: Serialize>(
    result: crate::error::Result<T>,
    message: &str,
) -> ControlResponse {
    match result {
        Ok(value) => ControlResponse::ok(message, to_data(&value)),
        Err(e) => ControlResponse::err(e.to_string()),
    }
}

pub async fn handle_command(engine: &SimulationEngine, command: ControlCommand) -> ControlResponse {
    debug!(?command, "control command");
    match command {
        ControlCommand::Start { config } => {
            let config = config.unwrap_or_else(|| engine.config());
            match engine.start(config).await {
                Ok(run_id) => ControlResponse::ok("Simulation started", Some(json!({ "runId": run_id }))),
                Err(e) => ControlResponse::err(e.to_string()),
            }
        }
        ControlCommand::Stop => outcome(engine.stop().await, "Simulation stopped"),
        ControlCommand::Pause => outcome(engine.pause().await, "Simulation paused"),
        ControlCommand::Resume => outcome(engine.resume().await, "Simulation resumed"),
        ControlCommand::SetSpeed { multiplier } => match engine.set_speed(multiplier).await {
            Ok(()) => ControlResponse::ok(
                format!("Speed set to {multiplier}x"),
                Some(json!({ "speedMultiplier": multiplier })),
            ),
            Err(e) => ControlResponse::err(e.to_string()),
        },
        ControlCommand::Configure { patch } => {
            outcome(engine.configure(patch).await, "Configuration updated")
        }
        ControlCommand::Status => ControlResponse::ok("OK", to_data(&engine.status())),
        ControlCommand::PoolState => ControlResponse::ok("OK", to_data(&engine.pool_state())),
        ControlCommand::Transactions { offset, limit } => outcome(
            engine.transactions(PageRequest { offset, limit }).await,
            "OK",
        ),
        ControlCommand::Messages { offset, limit } => {
            outcome(engine.messages(PageRequest { offset, limit }).await, "OK")
        }
        ControlCommand::Agents => ControlResponse::ok("OK", to_data(&engine.agents())),
    }
}

/// Parse one line of JSON and run it. Bad input becomes a failed response.
pub async fn handle_line(engine: &SimulationEngine, line: &str) -> ControlResponse {
    match serde_json::from_str::<ControlCommand>(line.trim()) {
        Ok(command) => handle_command(engine, command).await,
        Err(e) => ControlResponse::err(format!("Invalid JSON: {e}")),
    }
}
