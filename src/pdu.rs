//! Modbus PDU buffer and builder
//!
//! PDUs never exceed 253 bytes, so they live in a fixed stack array.
//! Multi-byte fields are big-endian on the wire.

use tracing::trace;

use crate::constants::{
    COIL_OFF, COIL_ON, EXCEPTION_FLAG, FC_ENCAPSULATED_INTERFACE, FC_READ_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, MAX_PDU_SIZE, MEI_READ_DEVICE_ID,
};
use crate::error::{ModbusError, ModbusException, ModbusResult};

/// Stack-allocated PDU
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    /// Empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Copy a PDU out of a byte slice
    pub fn from_slice(data: &[u8]) -> ModbusResult<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::frame(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();
        Ok(pdu)
    }

    /// Exception response: function code with the high bit set, then the code
    #[inline]
    pub fn exception(function_code: u8, exception: ModbusException) -> Self {
        let mut pdu = Self::new();
        pdu.data[0] = function_code | EXCEPTION_FLAG;
        pdu.data[1] = exception.code();
        pdu.len = 2;
        pdu
    }

    /// Append one byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> ModbusResult<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(ModbusError::frame("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Append a big-endian u16
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> ModbusResult<()> {
        self.extend(&value.to_be_bytes())
    }

    /// Append raw bytes
    #[inline]
    pub fn extend(&mut self, data: &[u8]) -> ModbusResult<()> {
        if self.len + data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::frame(format!(
                "PDU would exceed max size: {} + {} > {}",
                self.len,
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// PDU bytes written so far
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Number of bytes in the PDU
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing has been written
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Function code (first byte)
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// High bit of the function code is set
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .map(|fc| fc & EXCEPTION_FLAG != 0)
            .unwrap_or(false)
    }

    /// Exception code of an exception response
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() {
            self.as_slice().get(1).copied()
        } else {
            None
        }
    }

    /// Human-readable function code description
    pub fn function_code_description(fc: u8) -> &'static str {
        match fc & !EXCEPTION_FLAG {
            0x01 => "Read Coils",
            0x02 => "Read Discrete Inputs",
            0x03 => "Read Holding Registers",
            0x04 => "Read Input Registers",
            0x05 => "Write Single Coil",
            0x06 => "Write Single Register",
            0x0F => "Write Multiple Coils",
            0x10 => "Write Multiple Registers",
            0x17 => "Read/Write Multiple Registers",
            0x2B => "Encapsulated Interface Transport",
            _ => "Unknown Function",
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<[u8]> for ModbusPdu {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Pack bits LSB-first into bytes, padding the last byte with zeros.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Unpack `count` LSB-first bits.
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0))
        .collect()
}

/// Fluent PDU builder; every step fails once the PDU would exceed 253 bytes
pub struct PduBuilder {
    pdu: ModbusPdu,
}

impl Default for PduBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PduBuilder {
    /// Start an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            pdu: ModbusPdu::new(),
        }
    }

    /// Append the function code byte
    #[inline]
    pub fn function_code(mut self, fc: u8) -> ModbusResult<Self> {
        self.pdu.push(fc)?;
        Ok(self)
    }

    /// Add a big-endian u16 field (address, quantity or value)
    #[inline]
    pub fn word(mut self, value: u16) -> ModbusResult<Self> {
        self.pdu.push_u16(value)?;
        Ok(self)
    }

    /// Add a byte
    #[inline]
    pub fn byte(mut self, b: u8) -> ModbusResult<Self> {
        self.pdu.push(b)?;
        Ok(self)
    }

    /// Add raw data
    #[inline]
    pub fn data(mut self, data: &[u8]) -> ModbusResult<Self> {
        self.pdu.extend(data)?;
        Ok(self)
    }

    /// Add a byte count followed by big-endian registers
    pub fn registers(mut self, values: &[u16]) -> ModbusResult<Self> {
        let byte_count = values.len() * 2;
        if byte_count > u8::MAX as usize {
            return Err(ModbusError::invalid_data(format!(
                "Too many registers for one PDU: {}",
                values.len()
            )));
        }
        self.pdu.push(byte_count as u8)?;
        for &value in values {
            self.pdu.push_u16(value)?;
        }
        Ok(self)
    }

    /// Add a byte count followed by packed bits
    pub fn bits(mut self, values: &[bool]) -> ModbusResult<Self> {
        let packed = pack_bits(values);
        if packed.len() > u8::MAX as usize {
            return Err(ModbusError::invalid_data(format!(
                "Too many bits for one PDU: {}",
                values.len()
            )));
        }
        self.pdu.push(packed.len() as u8)?;
        self.pdu.extend(&packed)?;
        Ok(self)
    }

    /// Finish the PDU
    #[inline]
    pub fn build(self) -> ModbusPdu {
        if let Some(fc) = self.pdu.function_code() {
            trace!(
                "PDU built: FC={:02X} ({}), total_len={}",
                fc,
                ModbusPdu::function_code_description(fc),
                self.pdu.len()
            );
        }
        self.pdu
    }

    // ===== Request PDUs =====

    /// Read request for FC01-04
    pub fn build_read_request(fc: u8, start_address: u16, quantity: u16) -> ModbusResult<ModbusPdu> {
        if !matches!(fc, 0x01..=0x04) {
            return Err(ModbusError::invalid_function(fc));
        }
        Ok(PduBuilder::new()
            .function_code(fc)?
            .word(start_address)?
            .word(quantity)?
            .build())
    }

    /// Write single coil (FC05); also the FC05 response, which echoes the request
    pub fn build_write_single_coil(address: u16, value: bool) -> ModbusResult<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(FC_WRITE_SINGLE_COIL)?
            .word(address)?
            .word(if value { COIL_ON } else { COIL_OFF })?
            .build())
    }

    /// Write single register (FC06); also the FC06 response
    pub fn build_write_single_register(address: u16, value: u16) -> ModbusResult<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(FC_WRITE_SINGLE_REGISTER)?
            .word(address)?
            .word(value)?
            .build())
    }

    /// Write multiple coils (FC15)
    pub fn build_write_multiple_coils(address: u16, values: &[bool]) -> ModbusResult<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(FC_WRITE_MULTIPLE_COILS)?
            .word(address)?
            .word(values.len() as u16)?
            .bits(values)?
            .build())
    }

    /// Write multiple registers (FC16)
    pub fn build_write_multiple_registers(address: u16, values: &[u16]) -> ModbusResult<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(FC_WRITE_MULTIPLE_REGISTERS)?
            .word(address)?
            .word(values.len() as u16)?
            .registers(values)?
            .build())
    }

    /// Read/write multiple registers (FC23)
    pub fn build_read_write_multiple_registers(
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        values: &[u16],
    ) -> ModbusResult<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(FC_READ_WRITE_MULTIPLE_REGISTERS)?
            .word(read_address)?
            .word(read_quantity)?
            .word(write_address)?
            .word(values.len() as u16)?
            .registers(values)?
            .build())
    }

    /// Read device identification (FC43 / MEI 0x0E)
    pub fn build_read_device_identification(read_code: u8, object_id: u8) -> ModbusResult<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(FC_ENCAPSULATED_INTERFACE)?
            .byte(MEI_READ_DEVICE_ID)?
            .byte(read_code)?
            .byte(object_id)?
            .build())
    }

    // ===== Response PDUs =====

    /// FC01/02 response: byte count + packed bits
    pub fn build_bits_response(fc: u8, values: &[bool]) -> ModbusResult<ModbusPdu> {
        Ok(PduBuilder::new().function_code(fc)?.bits(values)?.build())
    }

    /// FC03/04/23 response: byte count + registers
    pub fn build_registers_response(fc: u8, values: &[u16]) -> ModbusResult<ModbusPdu> {
        Ok(PduBuilder::new().function_code(fc)?.registers(values)?.build())
    }

    /// FC15/16 response: starting address + quantity written
    pub fn build_write_multiple_response(fc: u8, address: u16, quantity: u16) -> ModbusResult<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(fc)?
            .word(address)?
            .word(quantity)?
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdu_append() {
        let mut pdu = ModbusPdu::default();
        assert!(pdu.is_empty());
        assert_eq!(pdu.function_code(), None);

        pdu.push(0x04).unwrap();
        pdu.extend(&[0x00, 0x10]).unwrap();
        pdu.push_u16(0x0002).unwrap();

        assert_eq!(pdu.len(), 5);
        assert_eq!(pdu.exception_code(), None);
        assert_eq!(pdu.as_ref(), &[0x04, 0x00, 0x10, 0x00, 0x02]);
    }

    #[test]
    fn test_pdu_overflow() {
        let mut pdu = ModbusPdu::from_slice(&[0u8; MAX_PDU_SIZE]).unwrap();
        assert!(pdu.push(0x01).is_err());
        assert!(ModbusPdu::from_slice(&[0u8; MAX_PDU_SIZE + 1]).is_err());
    }

    #[test]
    fn test_exception_pdu() {
        let pdu = ModbusPdu::exception(0x03, ModbusException::IllegalDataAddress);
        assert!(pdu.is_exception());
        assert_eq!(pdu.as_slice(), &[0x83, 0x02]);
        assert_eq!(pdu.exception_code(), Some(0x02));
    }

    #[test]
    fn test_pack_unpack_bits() {
        let bits = [true, false, true, true, false, false, false, false, true];
        let packed = pack_bits(&bits);
        assert_eq!(packed, vec![0x0D, 0x01]);
        assert_eq!(unpack_bits(&packed, bits.len()), bits.to_vec());
        assert_eq!(unpack_bits(&[0xFF], 10).len(), 10);
    }

    #[test]
    fn test_build_read_request_rejects_write_codes() {
        let pdu = PduBuilder::build_read_request(0x02, 0x00C4, 22).unwrap();
        assert_eq!(pdu.as_slice(), &[0x02, 0x00, 0xC4, 0x00, 0x16]);
        assert!(matches!(
            PduBuilder::build_read_request(0x06, 0, 1),
            Err(ModbusError::InvalidFunction { code: 0x06 })
        ));
    }

    #[test]
    fn test_build_single_writes() {
        let off = PduBuilder::build_write_single_coil(7, false).unwrap();
        assert_eq!(off.as_slice(), &[0x05, 0x00, 0x07, 0x00, 0x00]);

        let reg = PduBuilder::build_write_single_register(1, 0x0003).unwrap();
        assert_eq!(reg.as_slice(), &[0x06, 0x00, 0x01, 0x00, 0x03]);
    }

    #[test]
    fn test_build_read_write_and_identification() {
        let pdu = PduBuilder::build_read_write_multiple_registers(3, 6, 14, &[0x00FF, 0x00FF]).unwrap();
        assert_eq!(
            pdu.as_slice(),
            &[0x17, 0x00, 0x03, 0x00, 0x06, 0x00, 0x0E, 0x00, 0x02, 0x04, 0x00, 0xFF, 0x00, 0xFF]
        );

        let pdu = PduBuilder::build_read_device_identification(0x01, 0x00).unwrap();
        assert_eq!(pdu.as_slice(), &[0x2B, 0x0E, 0x01, 0x00]);
    }

    #[test]
    fn test_builder_overflow() {
        assert!(PduBuilder::build_registers_response(0x03, &[0; 126]).is_err());
        assert!(PduBuilder::build_bits_response(0x01, &[true; 2000]).is_ok());
    }

    #[test]
    fn test_build_write_multiple_coils() {
        // 10 coils starting at 19 pack to CD 01
        let bits = [true, false, true, true, false, false, true, true, true, false];
        let pdu = PduBuilder::build_write_multiple_coils(0x0013, &bits).unwrap();
        assert_eq!(
            pdu.as_slice(),
            &[0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0xCD, 0x01]
        );
    }

    #[test]
    fn test_build_write_multiple_response() {
        let pdu = PduBuilder::build_write_multiple_response(0x10, 0x0001, 2).unwrap();
        assert_eq!(pdu.as_slice(), &[0x10, 0x00, 0x01, 0x00, 0x02]);
    }

    #[test]
    fn test_build_registers_response() {
        let pdu = PduBuilder::build_registers_response(0x03, &[0; 5]).unwrap();
        assert_eq!(
            pdu.as_slice(),
            &[0x03, 0x0A, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }
}
