//! Logging setup for the binaries and embedding hosts

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ModbusError, ModbusResult};

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `level` when set. Fails if a subscriber is
/// already installed (e.g. by the host application).
pub fn init(level: &str) -> ModbusResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| ModbusError::configuration(format!("Failed to initialize logging: {}", e)))
}
