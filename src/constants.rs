//! Modbus TCP protocol constants and server defaults
//!
//! Quantity limits are the largest counts whose request and response both
//! fit in one 253-byte PDU.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Full MBAP header length on the wire
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2) + Unit ID(1) = 7 bytes
pub const MBAP_HEADER_LEN: usize = 7;

/// Bytes preceding the region counted by the MBAP length field
/// (Transaction ID + Protocol ID + Length)
pub const MBAP_LENGTH_OFFSET: usize = 6;

/// The only protocol identifier defined for Modbus
pub const MBAP_PROTOCOL_ID: u16 = 0;

/// Largest PDU (function code + data) carried in one frame
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU) = 254
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Minimum MBAP length field value: Unit ID + function code
pub const MIN_MBAP_LENGTH: usize = 2;

/// Largest complete frame: 6 + 254 = 260 bytes
pub const MAX_FRAME_LEN: usize = MBAP_LENGTH_OFFSET + MAX_MBAP_LENGTH;

/// Initial receive buffer capacity per connection, room for two full frames
pub const FRAME_BUFFER_SIZE: usize = 2 * MAX_FRAME_LEN;

// ============================================================================
// Quantity Limits
// ============================================================================

/// FC03/FC04 read quantity: 1 + 1 + N*2 <= 253 → 125
pub const MAX_READ_REGISTERS: usize = 125;

/// FC16 write quantity: 1 + 2 + 2 + 1 + N*2 <= 253 → 123
pub const MAX_WRITE_REGISTERS: usize = 123;

/// FC01/FC02 read quantity (fits in 250 data bytes)
pub const MAX_READ_COILS: usize = 2000;

/// FC15 write quantity (0x7B0)
pub const MAX_WRITE_COILS: usize = 1968;

/// FC23 write quantity: 1 + 2 + 2 + 2 + 2 + 1 + N*2 <= 253 → 121
pub const MAX_READ_WRITE_REGISTERS: usize = 121;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Read/Write Multiple Registers (FC23)
pub const FC_READ_WRITE_MULTIPLE_REGISTERS: u8 = 0x17;

/// Encapsulated Interface Transport (FC43)
pub const FC_ENCAPSULATED_INTERFACE: u8 = 0x2B;

/// MEI type for Read Device Identification
pub const MEI_READ_DEVICE_ID: u8 = 0x0E;

/// High bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Coil ON value in FC05
pub const COIL_ON: u16 = 0xFF00;

/// Coil OFF value in FC05
pub const COIL_OFF: u16 = 0x0000;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

// ============================================================================
// Server Defaults
// ============================================================================

/// Default listening address
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Default entries per table
pub const DEFAULT_TABLE_CAPACITY: usize = 100;

/// Largest table a 16-bit address space can reach
pub const MAX_TABLE_CAPACITY: usize = 0x1_0000;

/// Default unit identifier
pub const DEFAULT_UNIT_ID: u8 = 1;

/// Default read-idle timeout per connection (60 seconds)
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 60_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_constants() {
        assert_eq!(MBAP_HEADER_LEN, MBAP_LENGTH_OFFSET + 1);
        assert_eq!(MAX_PDU_SIZE, 253);
        assert_eq!(MAX_MBAP_LENGTH, 254);
        assert_eq!(MAX_FRAME_LEN, 260);
        assert_eq!(FRAME_BUFFER_SIZE, 520);
    }

    #[test]
    fn test_register_limits() {
        let read_pdu_size = 1 + 1 + (MAX_READ_REGISTERS * 2);
        assert!(read_pdu_size <= MAX_PDU_SIZE);

        let write_pdu_size = 1 + 2 + 2 + 1 + (MAX_WRITE_REGISTERS * 2);
        assert!(write_pdu_size <= MAX_PDU_SIZE);

        let rw_pdu_size = 1 + 2 + 2 + 2 + 2 + 1 + (MAX_READ_WRITE_REGISTERS * 2);
        assert!(rw_pdu_size <= MAX_PDU_SIZE);
    }

    #[test]
    fn test_coil_limits() {
        let read_coil_pdu = 1 + 1 + MAX_READ_COILS.div_ceil(8);
        assert!(read_coil_pdu <= MAX_PDU_SIZE);

        let write_coil_pdu = 1 + 2 + 2 + 1 + MAX_WRITE_COILS.div_ceil(8);
        assert!(write_coil_pdu <= MAX_PDU_SIZE);
    }
}
