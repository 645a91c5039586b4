//! Modbus application protocol types
//!
//! [`ModbusRequest`] and [`ModbusResponse`] are the decoded form of a PDU.
//! Conversion to and from bytes lives in [`crate::codec`].

use std::fmt;

use crate::constants::*;
use crate::identity::DeviceIdentification;

/// Unit identifier carried in the MBAP header
pub type UnitId = u8;

/// Supported function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusFunction {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
    ReadWriteMultipleRegisters,
    EncapsulatedInterface,
}

impl ModbusFunction {
    /// Parse a function code
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            FC_READ_COILS => Some(Self::ReadCoils),
            FC_READ_DISCRETE_INPUTS => Some(Self::ReadDiscreteInputs),
            FC_READ_HOLDING_REGISTERS => Some(Self::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Some(Self::ReadInputRegisters),
            FC_WRITE_SINGLE_COIL => Some(Self::WriteSingleCoil),
            FC_WRITE_SINGLE_REGISTER => Some(Self::WriteSingleRegister),
            FC_WRITE_MULTIPLE_COILS => Some(Self::WriteMultipleCoils),
            FC_WRITE_MULTIPLE_REGISTERS => Some(Self::WriteMultipleRegisters),
            FC_READ_WRITE_MULTIPLE_REGISTERS => Some(Self::ReadWriteMultipleRegisters),
            FC_ENCAPSULATED_INTERFACE => Some(Self::EncapsulatedInterface),
            _ => None,
        }
    }

    /// Wire value
    pub fn to_u8(self) -> u8 {
        match self {
            Self::ReadCoils => FC_READ_COILS,
            Self::ReadDiscreteInputs => FC_READ_DISCRETE_INPUTS,
            Self::ReadHoldingRegisters => FC_READ_HOLDING_REGISTERS,
            Self::ReadInputRegisters => FC_READ_INPUT_REGISTERS,
            Self::WriteSingleCoil => FC_WRITE_SINGLE_COIL,
            Self::WriteSingleRegister => FC_WRITE_SINGLE_REGISTER,
            Self::WriteMultipleCoils => FC_WRITE_MULTIPLE_COILS,
            Self::WriteMultipleRegisters => FC_WRITE_MULTIPLE_REGISTERS,
            Self::ReadWriteMultipleRegisters => FC_READ_WRITE_MULTIPLE_REGISTERS,
            Self::EncapsulatedInterface => FC_ENCAPSULATED_INTERFACE,
        }
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (0x{:02X})",
            crate::pdu::ModbusPdu::function_code_description(self.to_u8()),
            self.to_u8()
        )
    }
}

/// Decoded request PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, values: Vec<bool> },
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
    ReadWriteMultipleRegisters {
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        values: Vec<u16>,
    },
    ReadDeviceIdentification { read_code: u8, object_id: u8 },
}

impl ModbusRequest {
    /// Function of this request
    pub fn function(&self) -> ModbusFunction {
        match self {
            Self::ReadCoils { .. } => ModbusFunction::ReadCoils,
            Self::ReadDiscreteInputs { .. } => ModbusFunction::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => ModbusFunction::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => ModbusFunction::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => ModbusFunction::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => ModbusFunction::WriteSingleRegister,
            Self::WriteMultipleCoils { .. } => ModbusFunction::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => ModbusFunction::WriteMultipleRegisters,
            Self::ReadWriteMultipleRegisters { .. } => ModbusFunction::ReadWriteMultipleRegisters,
            Self::ReadDeviceIdentification { .. } => ModbusFunction::EncapsulatedInterface,
        }
    }
}

/// Decoded (non-exception) response PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    ReadCoils(Vec<bool>),
    ReadDiscreteInputs(Vec<bool>),
    ReadHoldingRegisters(Vec<u16>),
    ReadInputRegisters(Vec<u16>),
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, quantity: u16 },
    WriteMultipleRegisters { address: u16, quantity: u16 },
    ReadWriteMultipleRegisters(Vec<u16>),
    ReadDeviceIdentification(DeviceIdentification),
}

impl ModbusResponse {
    /// Function of this response
    pub fn function(&self) -> ModbusFunction {
        match self {
            Self::ReadCoils(_) => ModbusFunction::ReadCoils,
            Self::ReadDiscreteInputs(_) => ModbusFunction::ReadDiscreteInputs,
            Self::ReadHoldingRegisters(_) => ModbusFunction::ReadHoldingRegisters,
            Self::ReadInputRegisters(_) => ModbusFunction::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => ModbusFunction::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => ModbusFunction::WriteSingleRegister,
            Self::WriteMultipleCoils { .. } => ModbusFunction::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => ModbusFunction::WriteMultipleRegisters,
            Self::ReadWriteMultipleRegisters(_) => ModbusFunction::ReadWriteMultipleRegisters,
            Self::ReadDeviceIdentification(_) => ModbusFunction::EncapsulatedInterface,
        }
    }
}
