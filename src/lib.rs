//! # Floor Modbus - Embedded Modbus TCP Slave
//!
//! A small Modbus TCP slave that exposes an in-memory register map to
//! factory-floor equipment (PLCs, HMIs, SCADA masters). A host application
//! starts it, writes process values into the shared [`RegisterStore`] and
//! reads back whatever the masters write.
//!
//! ## Features
//!
//! - **Four tables**: discrete inputs, coils, input registers, holding registers
//! - **Shared store**: every connection sees the same tables behind one lock
//! - **Per-request atomicity**: a multi-register write is never observed half done
//! - **Exception responses**: bad requests are answered, the connection stays open
//! - **Async**: one Tokio task per connection, graceful shutdown
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Server | Client |
//! |------|----------|--------|--------|
//! | 0x01 | Read Coils | ✅ | ✅ |
//! | 0x02 | Read Discrete Inputs | ✅ | ✅ |
//! | 0x03 | Read Holding Registers | ✅ | ✅ |
//! | 0x04 | Read Input Registers | ✅ | ✅ |
//! | 0x05 | Write Single Coil | ✅ | ✅ |
//! | 0x06 | Write Single Register | ✅ | ✅ |
//! | 0x0F | Write Multiple Coils | ✅ | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ | ✅ |
//! | 0x17 | Read/Write Multiple Registers | ✅ | ✅ |
//! | 0x2B / 0x0E | Read Device Identification | ✅ | ✅ |
//!
//! Anything else is answered with exception 0x01 (Illegal Function).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use floor_modbus::{ModbusTcpServer, ServerConfig, ModbusResult, Table};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let config = ServerConfig::new().with_port(5020).with_table_capacity(1000);
//!     let server = ModbusTcpServer::bind(config).await?;
//!
//!     // Publish a process value before masters connect
//!     server.store().write(Table::InputRegisters, 0, &[230]).ok();
//!
//!     let handle = server.spawn();
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and exception codes
pub mod error;

/// Modbus protocol constants
pub mod constants;

/// Server configuration
pub mod config;

/// Register tables shared by all connections
pub mod store;

/// Stack-allocated PDU and builders
pub mod pdu;

/// Function codes and request/response types
pub mod protocol;

/// PDU encoding and decoding
pub mod codec;

/// Read Device Identification objects
pub mod identity;

/// MBAP framing over a byte stream
pub mod transport;

// ============================================================================
// Server and client
// ============================================================================

/// Per-connection request loop
pub mod connection;

/// Listener, lifecycle and statistics
pub mod server;

/// Modbus TCP client
pub mod client;

/// Logging setup
pub mod logging;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use floor_modbus::tokio) ===
pub use tokio;

// === Server API ===
pub use config::ServerConfig;
pub use server::{run_blocking, ModbusTcpServer, ServerHandle, ServerStats, ShutdownHandle};
pub use store::{RegisterStore, Table};

// === Client API ===
pub use client::ModbusTcpClient;

// === Error handling ===
pub use error::{ModbusError, ModbusException, ModbusResult};

// === Core types ===
pub use identity::{DeviceIdentification, DeviceObject, ServerIdentity};
pub use protocol::{ModbusFunction, ModbusRequest, ModbusResponse, UnitId};

// === Framing and PDU (advanced usage) ===
pub use pdu::{ModbusPdu, PduBuilder};
pub use transport::{MbapFrame, MbapFramer};

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    DEFAULT_TCP_PORT, MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Floor Modbus v{} - embedded Modbus TCP slave", VERSION)
}
