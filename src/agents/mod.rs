// src/agents/mod.rs

pub mod agent;
pub mod config;
pub mod decision;
pub mod personality;
pub mod pool;
