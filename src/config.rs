//! # Server Configuration
//!
//! Listening address, port, table capacity and unit identifier for the
//! Modbus slave. The struct derives `serde` traits so the hosting
//! application can embed it in its own configuration source; missing
//! fields fall back to the defaults below.
//!
//! | Option | Default |
//! |--------|---------|
//! | `address` | `0.0.0.0` |
//! | `port` | `502` |
//! | `table_capacity` | `100` |
//! | `unit_id` | `1` |
//! | `idle_timeout_ms` | `60000` (`0` disables) |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ADDRESS, DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_TABLE_CAPACITY, DEFAULT_TCP_PORT,
    DEFAULT_UNIT_ID, MAX_TABLE_CAPACITY,
};
use crate::error::{ModbusError, ModbusResult};

/// Modbus TCP slave configuration.
///
/// # Example
///
/// ```rust
/// use floor_modbus::ServerConfig;
///
/// let config = ServerConfig::new()
///     .with_address("127.0.0.1")
///     .with_port(5020)
///     .with_table_capacity(200);
///
/// assert_eq!(config.port, 5020);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind (IP or host name).
    pub address: String,
    /// TCP port to bind. `0` lets the OS pick one.
    pub port: u16,
    /// Entries in each of the four tables.
    pub table_capacity: usize,
    /// Unit identifier this slave answers as.
    pub unit_id: u8,
    /// Close connections that send nothing for this long (milliseconds).
    pub idle_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_TCP_PORT,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            unit_id: DEFAULT_UNIT_ID,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the bind port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the capacity of every table.
    pub fn with_table_capacity(mut self, capacity: usize) -> Self {
        self.table_capacity = capacity;
        self
    }

    /// Set the unit identifier.
    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    /// Set the read-idle timeout in milliseconds (`0` disables it).
    pub fn with_idle_timeout_ms(mut self, idle_timeout_ms: u64) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    /// Read-idle timeout, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    /// `address:port` string used for binding and logging.
    pub fn bind_address(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// Check the configuration before the server binds.
    pub fn validate(&self) -> ModbusResult<()> {
        if self.address.trim().is_empty() {
            return Err(ModbusError::configuration("address must not be empty"));
        }
        if self.table_capacity == 0 || self.table_capacity > MAX_TABLE_CAPACITY {
            return Err(ModbusError::configuration(format!(
                "table_capacity {} out of range (1-{})",
                self.table_capacity, MAX_TABLE_CAPACITY
            )));
        }
        Ok(())
    }
}
