// src/token/mod.rs
// -----------------
pub mod definitions;

// Re-export so callers don't have to dive another level down the path.
pub use definitions::{TokenInfo, default_token};
