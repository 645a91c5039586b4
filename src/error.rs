//! Error types for the Modbus slave
//!
//! Two layers of failure exist on a Modbus TCP connection:
//!
//! - [`ModbusException`]: request-level failures answered in-band with an
//!   exception response. The connection stays open.
//! - [`ModbusError`]: everything else. Transport failures (I/O, malformed
//!   MBAP header, truncated stream) terminate the connection; bind and
//!   configuration failures stop the server before it starts.

use std::fmt;

use thiserror::Error;

use crate::constants::{
    EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE, EXCEPTION_ILLEGAL_FUNCTION,
    EXCEPTION_SERVER_DEVICE_FAILURE,
};

/// Result type used throughout the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Modbus exception codes returned to the client in an exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ModbusException {
    /// The function code is not supported, or the table is read-only (0x01)
    IllegalFunction,
    /// The address range falls outside the table (0x02)
    IllegalDataAddress,
    /// A value or quantity in the request is not acceptable (0x03)
    IllegalDataValue,
    /// Unrecoverable failure while servicing the request (0x04)
    ServerDeviceFailure,
}

impl ModbusException {
    /// Wire code of this exception
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            Self::IllegalFunction => EXCEPTION_ILLEGAL_FUNCTION,
            Self::IllegalDataAddress => EXCEPTION_ILLEGAL_DATA_ADDRESS,
            Self::IllegalDataValue => EXCEPTION_ILLEGAL_DATA_VALUE,
            Self::ServerDeviceFailure => EXCEPTION_SERVER_DEVICE_FAILURE,
        }
    }

    /// Parse a wire code. Codes this server never emits return `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            EXCEPTION_ILLEGAL_FUNCTION => Some(Self::IllegalFunction),
            EXCEPTION_ILLEGAL_DATA_ADDRESS => Some(Self::IllegalDataAddress),
            EXCEPTION_ILLEGAL_DATA_VALUE => Some(Self::IllegalDataValue),
            EXCEPTION_SERVER_DEVICE_FAILURE => Some(Self::ServerDeviceFailure),
            _ => None,
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
        };
        write!(f, "{} (0x{:02X})", name, self.code())
    }
}

/// Main error type
#[derive(Debug, Error)]
pub enum ModbusError {
    /// Underlying socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection refused, reset or closed mid-frame
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Operation did not complete in time
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// MBAP-level violation (e.g. non-zero protocol id)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Frame could not be parsed or built
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Function code is not supported
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// Request or response data is malformed
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// The remote end answered with an exception response
    #[error("Modbus exception for function 0x{function:02X}: {exception}")]
    Exception {
        function: u8,
        exception: ModbusException,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ModbusError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a frame error
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create an invalid function error
    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an exception error
    pub fn exception(function: u8, exception: ModbusException) -> Self {
        Self::Exception {
            function,
            exception,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error ends the TCP connection it occurred on.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Connection { .. }
                | Self::Timeout { .. }
                | Self::Protocol { .. }
                | Self::Frame { .. }
        )
    }

    /// Exception carried by this error, if any
    pub fn as_exception(&self) -> Option<ModbusException> {
        match self {
            Self::Exception { exception, .. } => Some(*exception),
            _ => None,
        }
    }
}
