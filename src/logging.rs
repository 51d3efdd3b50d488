// src/logging.rs

//! Subscriber setup for binaries. The library itself only emits events.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::{Result, SimError};

/// Install a fmt subscriber at `level`. `RUST_LOG` wins when set.
/// A second call is a no-op.
pub fn init(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| SimError::InvalidConfiguration(format!("log level {level:?}: {e}")))?,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .try_init()
        .ok();

    Ok(())
}
