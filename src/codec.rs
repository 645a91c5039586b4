//! # PDU Codec
//!
//! Conversion between raw PDUs and [`ModbusRequest`] / [`ModbusResponse`].
//!
//! Server side:
//! - [`decode_request`] validates structure and quantities before anything
//!   touches the store. Failures are returned as the [`ModbusException`] to
//!   answer with.
//! - [`encode_response`] and [`encode_exception`] build the reply PDU.
//!
//! Client side: [`encode_request`] and [`decode_response`].
//!
//! All numeric fields are big-endian.

use crate::constants::*;
use crate::error::{ModbusError, ModbusException, ModbusResult};
use crate::identity::{DeviceIdentification, DeviceObject};
use crate::pdu::{unpack_bits, ModbusPdu, PduBuilder};
use crate::protocol::{ModbusFunction, ModbusRequest, ModbusResponse};

/// Cursor over PDU bytes. Every accessor returns `None` once the data runs out.
struct PduReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PduReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn u16(&mut self) -> Option<u16> {
        let bytes = self.data.get(self.pos..self.pos + 2)?;
        self.pos += 2;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos + len)?;
        self.pos += len;
        Some(bytes)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

// ============================================================================
// Server side
// ============================================================================

/// Decode a request PDU.
///
/// Returns the exception the server should answer with when the request
/// is unsupported or malformed:
/// - unknown function code or MEI type → `IllegalFunction`
/// - truncated or trailing bytes, byte count mismatch, quantity out of
///   protocol limits, bad coil value → `IllegalDataValue`
/// - address range past 0xFFFF → `IllegalDataAddress`
///
/// # Example
///
/// ```rust
/// use floor_modbus::codec::decode_request;
/// use floor_modbus::ModbusRequest;
///
/// let request = decode_request(&[0x03, 0x00, 0x00, 0x00, 0x05]).unwrap();
/// assert_eq!(request, ModbusRequest::ReadHoldingRegisters { address: 0, quantity: 5 });
/// ```
pub fn decode_request(pdu: &[u8]) -> Result<ModbusRequest, ModbusException> {
    use ModbusException::{IllegalDataValue, IllegalFunction};

    let mut r = PduReader::new(pdu);
    let fc = r.u8().ok_or(IllegalDataValue)?;
    let function = ModbusFunction::from_u8(fc).ok_or(IllegalFunction)?;

    let request = match function {
        ModbusFunction::ReadCoils
        | ModbusFunction::ReadDiscreteInputs
        | ModbusFunction::ReadHoldingRegisters
        | ModbusFunction::ReadInputRegisters => {
            let address = r.u16().ok_or(IllegalDataValue)?;
            let quantity = r.u16().ok_or(IllegalDataValue)?;
            let max = if matches!(
                function,
                ModbusFunction::ReadCoils | ModbusFunction::ReadDiscreteInputs
            ) {
                MAX_READ_COILS
            } else {
                MAX_READ_REGISTERS
            };
            check_quantity(quantity, max)?;
            check_address(address, quantity)?;
            match function {
                ModbusFunction::ReadCoils => ModbusRequest::ReadCoils { address, quantity },
                ModbusFunction::ReadDiscreteInputs => {
                    ModbusRequest::ReadDiscreteInputs { address, quantity }
                }
                ModbusFunction::ReadHoldingRegisters => {
                    ModbusRequest::ReadHoldingRegisters { address, quantity }
                }
                _ => ModbusRequest::ReadInputRegisters { address, quantity },
            }
        }

        ModbusFunction::WriteSingleCoil => {
            let address = r.u16().ok_or(IllegalDataValue)?;
            let value = match r.u16().ok_or(IllegalDataValue)? {
                COIL_ON => true,
                COIL_OFF => false,
                _ => return Err(IllegalDataValue),
            };
            ModbusRequest::WriteSingleCoil { address, value }
        }

        ModbusFunction::WriteSingleRegister => {
            let address = r.u16().ok_or(IllegalDataValue)?;
            let value = r.u16().ok_or(IllegalDataValue)?;
            ModbusRequest::WriteSingleRegister { address, value }
        }

        ModbusFunction::WriteMultipleCoils => {
            let address = r.u16().ok_or(IllegalDataValue)?;
            let quantity = r.u16().ok_or(IllegalDataValue)?;
            check_quantity(quantity, MAX_WRITE_COILS)?;
            let data = read_counted(&mut r, (quantity as usize).div_ceil(8))?;
            check_address(address, quantity)?;
            ModbusRequest::WriteMultipleCoils {
                address,
                values: unpack_bits(data, quantity as usize),
            }
        }

        ModbusFunction::WriteMultipleRegisters => {
            let address = r.u16().ok_or(IllegalDataValue)?;
            let quantity = r.u16().ok_or(IllegalDataValue)?;
            check_quantity(quantity, MAX_WRITE_REGISTERS)?;
            let data = read_counted(&mut r, quantity as usize * 2)?;
            check_address(address, quantity)?;
            ModbusRequest::WriteMultipleRegisters {
                address,
                values: words(data),
            }
        }

        ModbusFunction::ReadWriteMultipleRegisters => {
            let read_address = r.u16().ok_or(IllegalDataValue)?;
            let read_quantity = r.u16().ok_or(IllegalDataValue)?;
            let write_address = r.u16().ok_or(IllegalDataValue)?;
            let write_quantity = r.u16().ok_or(IllegalDataValue)?;
            check_quantity(read_quantity, MAX_READ_REGISTERS)?;
            check_quantity(write_quantity, MAX_READ_WRITE_REGISTERS)?;
            let data = read_counted(&mut r, write_quantity as usize * 2)?;
            check_address(read_address, read_quantity)?;
            check_address(write_address, write_quantity)?;
            ModbusRequest::ReadWriteMultipleRegisters {
                read_address,
                read_quantity,
                write_address,
                values: words(data),
            }
        }

        ModbusFunction::EncapsulatedInterface => {
            if r.u8().ok_or(IllegalDataValue)? != MEI_READ_DEVICE_ID {
                return Err(IllegalFunction);
            }
            let read_code = r.u8().ok_or(IllegalDataValue)?;
            let object_id = r.u8().ok_or(IllegalDataValue)?;
            ModbusRequest::ReadDeviceIdentification {
                read_code,
                object_id,
            }
        }
    };

    if r.remaining() != 0 {
        return Err(IllegalDataValue);
    }
    Ok(request)
}

fn check_quantity(quantity: u16, max: usize) -> Result<(), ModbusException> {
    if quantity == 0 || quantity as usize > max {
        return Err(ModbusException::IllegalDataValue);
    }
    Ok(())
}

fn check_address(address: u16, quantity: u16) -> Result<(), ModbusException> {
    if address as usize + quantity as usize > MAX_TABLE_CAPACITY {
        return Err(ModbusException::IllegalDataAddress);
    }
    Ok(())
}

/// Byte count field followed by exactly that many bytes, which must equal
/// `expected` and end the PDU.
fn read_counted<'a>(r: &mut PduReader<'a>, expected: usize) -> Result<&'a [u8], ModbusException> {
    let byte_count = r.u8().ok_or(ModbusException::IllegalDataValue)? as usize;
    if byte_count != expected || r.remaining() != byte_count {
        return Err(ModbusException::IllegalDataValue);
    }
    r.take(byte_count).ok_or(ModbusException::IllegalDataValue)
}

fn words(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode a response PDU.
pub fn encode_response(response: &ModbusResponse) -> ModbusResult<ModbusPdu> {
    let fc = response.function().to_u8();
    match response {
        ModbusResponse::ReadCoils(bits) | ModbusResponse::ReadDiscreteInputs(bits) => {
            PduBuilder::build_bits_response(fc, bits)
        }
        ModbusResponse::ReadHoldingRegisters(values)
        | ModbusResponse::ReadInputRegisters(values)
        | ModbusResponse::ReadWriteMultipleRegisters(values) => {
            PduBuilder::build_registers_response(fc, values)
        }
        ModbusResponse::WriteSingleCoil { address, value } => {
            PduBuilder::build_write_single_coil(*address, *value)
        }
        ModbusResponse::WriteSingleRegister { address, value } => {
            PduBuilder::build_write_single_register(*address, *value)
        }
        ModbusResponse::WriteMultipleCoils { address, quantity }
        | ModbusResponse::WriteMultipleRegisters { address, quantity } => {
            PduBuilder::build_write_multiple_response(fc, *address, *quantity)
        }
        ModbusResponse::ReadDeviceIdentification(ident) => encode_device_identification(ident),
    }
}

fn encode_device_identification(ident: &DeviceIdentification) -> ModbusResult<ModbusPdu> {
    let mut builder = PduBuilder::new()
        .function_code(FC_ENCAPSULATED_INTERFACE)?
        .byte(MEI_READ_DEVICE_ID)?
        .byte(ident.read_code)?
        .byte(ident.conformity_level)?
        .byte(if ident.more_follows { 0xFF } else { 0x00 })?
        .byte(ident.next_object_id)?
        .byte(ident.objects.len() as u8)?;
    for object in &ident.objects {
        let value = object.value.as_bytes();
        if value.len() > u8::MAX as usize {
            return Err(ModbusError::invalid_data(format!(
                "Identification object 0x{:02X} too long: {} bytes",
                object.id,
                value.len()
            )));
        }
        builder = builder
            .byte(object.id)?
            .byte(value.len() as u8)?
            .data(value)?;
    }
    Ok(builder.build())
}

/// Encode an exception response: `function_code | 0x80`, then the code.
#[inline]
pub fn encode_exception(function_code: u8, exception: ModbusException) -> ModbusPdu {
    ModbusPdu::exception(function_code, exception)
}

// ============================================================================
// Client side
// ============================================================================

/// Encode a request PDU.
pub fn encode_request(request: &ModbusRequest) -> ModbusResult<ModbusPdu> {
    let fc = request.function().to_u8();
    match request {
        ModbusRequest::ReadCoils { address, quantity }
        | ModbusRequest::ReadDiscreteInputs { address, quantity }
        | ModbusRequest::ReadHoldingRegisters { address, quantity }
        | ModbusRequest::ReadInputRegisters { address, quantity } => {
            PduBuilder::build_read_request(fc, *address, *quantity)
        }
        ModbusRequest::WriteSingleCoil { address, value } => {
            PduBuilder::build_write_single_coil(*address, *value)
        }
        ModbusRequest::WriteSingleRegister { address, value } => {
            PduBuilder::build_write_single_register(*address, *value)
        }
        ModbusRequest::WriteMultipleCoils { address, values } => {
            PduBuilder::build_write_multiple_coils(*address, values)
        }
        ModbusRequest::WriteMultipleRegisters { address, values } => {
            PduBuilder::build_write_multiple_registers(*address, values)
        }
        ModbusRequest::ReadWriteMultipleRegisters {
            read_address,
            read_quantity,
            write_address,
            values,
        } => PduBuilder::build_read_write_multiple_registers(
            *read_address,
            *read_quantity,
            *write_address,
            values,
        ),
        ModbusRequest::ReadDeviceIdentification {
            read_code,
            object_id,
        } => PduBuilder::build_read_device_identification(*read_code, *object_id),
    }
}

/// Decode the response PDU answering `request`.
///
/// An exception response becomes [`ModbusError::Exception`].
pub fn decode_response(request: &ModbusRequest, pdu: &[u8]) -> ModbusResult<ModbusResponse> {
    let fc = request.function().to_u8();
    let mut r = PduReader::new(pdu);
    let received = r
        .u8()
        .ok_or_else(|| ModbusError::invalid_data("Empty response PDU"))?;

    if received == fc | EXCEPTION_FLAG {
        let code = r
            .u8()
            .ok_or_else(|| ModbusError::invalid_data("Exception response without code"))?;
        let exception = ModbusException::from_code(code).ok_or_else(|| {
            ModbusError::protocol(format!("Unknown exception code 0x{:02X}", code))
        })?;
        return Err(ModbusError::exception(fc, exception));
    }
    if received != fc {
        return Err(ModbusError::protocol(format!(
            "Function code mismatch: expected 0x{:02X}, got 0x{:02X}",
            fc, received
        )));
    }

    let truncated = || ModbusError::invalid_data(format!("Truncated response for FC 0x{:02X}", fc));

    let response = match request {
        ModbusRequest::ReadCoils { quantity, .. }
        | ModbusRequest::ReadDiscreteInputs { quantity, .. } => {
            let data = response_counted(&mut r, (*quantity as usize).div_ceil(8))?;
            let bits = unpack_bits(data, *quantity as usize);
            if matches!(request, ModbusRequest::ReadCoils { .. }) {
                ModbusResponse::ReadCoils(bits)
            } else {
                ModbusResponse::ReadDiscreteInputs(bits)
            }
        }
        ModbusRequest::ReadHoldingRegisters { quantity, .. }
        | ModbusRequest::ReadInputRegisters { quantity, .. } => {
            let values = words(response_counted(&mut r, *quantity as usize * 2)?);
            if matches!(request, ModbusRequest::ReadHoldingRegisters { .. }) {
                ModbusResponse::ReadHoldingRegisters(values)
            } else {
                ModbusResponse::ReadInputRegisters(values)
            }
        }
        ModbusRequest::ReadWriteMultipleRegisters { read_quantity, .. } => {
            let values = words(response_counted(&mut r, *read_quantity as usize * 2)?);
            ModbusResponse::ReadWriteMultipleRegisters(values)
        }
        ModbusRequest::WriteSingleCoil { .. } => {
            let address = r.u16().ok_or_else(truncated)?;
            let value = match r.u16().ok_or_else(truncated)? {
                COIL_ON => true,
                COIL_OFF => false,
                other => {
                    return Err(ModbusError::invalid_data(format!(
                        "Invalid coil echo value 0x{:04X}",
                        other
                    )))
                }
            };
            ModbusResponse::WriteSingleCoil { address, value }
        }
        ModbusRequest::WriteSingleRegister { .. } => {
            let address = r.u16().ok_or_else(truncated)?;
            let value = r.u16().ok_or_else(truncated)?;
            ModbusResponse::WriteSingleRegister { address, value }
        }
        ModbusRequest::WriteMultipleCoils { .. } => {
            let address = r.u16().ok_or_else(truncated)?;
            let quantity = r.u16().ok_or_else(truncated)?;
            ModbusResponse::WriteMultipleCoils { address, quantity }
        }
        ModbusRequest::WriteMultipleRegisters { .. } => {
            let address = r.u16().ok_or_else(truncated)?;
            let quantity = r.u16().ok_or_else(truncated)?;
            ModbusResponse::WriteMultipleRegisters { address, quantity }
        }
        ModbusRequest::ReadDeviceIdentification { .. } => {
            ModbusResponse::ReadDeviceIdentification(decode_device_identification(&mut r)?)
        }
    };

    if r.remaining() != 0 {
        return Err(ModbusError::invalid_data(format!(
            "{} trailing bytes in response for FC 0x{:02X}",
            r.remaining(),
            fc
        )));
    }
    Ok(response)
}

fn response_counted<'a>(r: &mut PduReader<'a>, expected: usize) -> ModbusResult<&'a [u8]> {
    let byte_count = r
        .u8()
        .ok_or_else(|| ModbusError::invalid_data("Missing byte count"))? as usize;
    if byte_count != expected {
        return Err(ModbusError::invalid_data(format!(
            "Byte count {} does not match expected {}",
            byte_count, expected
        )));
    }
    r.take(byte_count)
        .ok_or_else(|| ModbusError::invalid_data("Response shorter than its byte count"))
}

fn decode_device_identification(r: &mut PduReader<'_>) -> ModbusResult<DeviceIdentification> {
    let truncated = || ModbusError::invalid_data("Truncated device identification response");

    if r.u8().ok_or_else(truncated)? != MEI_READ_DEVICE_ID {
        return Err(ModbusError::protocol("Unexpected MEI type in response"));
    }
    let read_code = r.u8().ok_or_else(truncated)?;
    let conformity_level = r.u8().ok_or_else(truncated)?;
    let more_follows = r.u8().ok_or_else(truncated)? == 0xFF;
    let next_object_id = r.u8().ok_or_else(truncated)?;
    let count = r.u8().ok_or_else(truncated)?;

    let mut objects = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = r.u8().ok_or_else(truncated)?;
        let len = r.u8().ok_or_else(truncated)? as usize;
        let value = r.take(len).ok_or_else(truncated)?;
        objects.push(DeviceObject {
            id,
            value: String::from_utf8_lossy(value).into_owned(),
        });
    }

    Ok(DeviceIdentification {
        read_code,
        conformity_level,
        more_follows,
        next_object_id,
        objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{ServerIdentity, READ_CODE_BASIC};

    fn sample_requests() -> Vec<ModbusRequest> {
        vec![
            ModbusRequest::ReadCoils { address: 0, quantity: 13 },
            ModbusRequest::ReadDiscreteInputs { address: 7, quantity: 2000 },
            ModbusRequest::ReadHoldingRegisters { address: 0, quantity: 5 },
            ModbusRequest::ReadInputRegisters { address: 90, quantity: 125 },
            ModbusRequest::WriteSingleCoil { address: 3, value: true },
            ModbusRequest::WriteSingleCoil { address: 3, value: false },
            ModbusRequest::WriteSingleRegister { address: 0, value: 0x002A },
            ModbusRequest::WriteMultipleCoils {
                address: 19,
                values: vec![true, false, true, true, false, false, true, true, true, false],
            },
            ModbusRequest::WriteMultipleRegisters { address: 1, values: vec![0x000A, 0x0102] },
            ModbusRequest::ReadWriteMultipleRegisters {
                read_address: 3,
                read_quantity: 6,
                write_address: 14,
                values: vec![0x00FF, 0x00FF, 0x00FF],
            },
            ModbusRequest::ReadDeviceIdentification { read_code: 1, object_id: 0 },
        ]
    }

    #[test]
    fn test_request_roundtrip() {
        for request in sample_requests() {
            let pdu = encode_request(&request).unwrap();
            assert_eq!(decode_request(pdu.as_slice()), Ok(request));
        }
    }

    #[test]
    fn test_response_roundtrip() {
        let cases = vec![
            (
                ModbusRequest::ReadCoils { address: 0, quantity: 10 },
                ModbusResponse::ReadCoils(vec![true, false, true, false, false, true, true, false, true, true]),
            ),
            (
                ModbusRequest::ReadDiscreteInputs { address: 196, quantity: 13 },
                ModbusResponse::ReadDiscreteInputs(vec![
                    false, false, true, true, false, true, false, true, true, true, false, true, true,
                ]),
            ),
            (
                ModbusRequest::ReadHoldingRegisters { address: 0, quantity: 3 },
                ModbusResponse::ReadHoldingRegisters(vec![0, 0x002A, 0xFFFF]),
            ),
            (
                ModbusRequest::ReadInputRegisters { address: 0, quantity: 2 },
                ModbusResponse::ReadInputRegisters(vec![0x1234, 0xABCD]),
            ),
            (
                ModbusRequest::WriteSingleCoil { address: 0xAC, value: true },
                ModbusResponse::WriteSingleCoil { address: 0xAC, value: true },
            ),
            (
                ModbusRequest::WriteSingleCoil { address: 0xAC, value: false },
                ModbusResponse::WriteSingleCoil { address: 0xAC, value: false },
            ),
            (
                ModbusRequest::WriteSingleRegister { address: 1, value: 0x0003 },
                ModbusResponse::WriteSingleRegister { address: 1, value: 0x0003 },
            ),
            (
                ModbusRequest::WriteMultipleCoils {
                    address: 19,
                    values: vec![true, false, true, true, false, false, true, true, true, false],
                },
                ModbusResponse::WriteMultipleCoils { address: 19, quantity: 10 },
            ),
            (
                ModbusRequest::WriteMultipleRegisters { address: 1, values: vec![1, 2] },
                ModbusResponse::WriteMultipleRegisters { address: 1, quantity: 2 },
            ),
            (
                ModbusRequest::ReadWriteMultipleRegisters {
                    read_address: 0,
                    read_quantity: 1,
                    write_address: 0,
                    values: vec![9],
                },
                ModbusResponse::ReadWriteMultipleRegisters(vec![9]),
            ),
            (
                ModbusRequest::ReadDeviceIdentification { read_code: 1, object_id: 0 },
                ModbusResponse::ReadDeviceIdentification(
                    ServerIdentity::default().read(READ_CODE_BASIC, 0).unwrap(),
                ),
            ),
        ];

        for (request, response) in cases {
            let pdu = encode_response(&response).unwrap();
            assert_eq!(decode_response(&request, pdu.as_slice()).unwrap(), response);
        }
    }

    #[test]
    fn test_bit_response_padding() {
        // 13 inputs: second byte carries 5 bits, upper 3 stay zero
        let bits = vec![
            false, false, true, true, false, true, false, true, true, true, false, true, true,
        ];
        let pdu = encode_response(&ModbusResponse::ReadDiscreteInputs(bits)).unwrap();
        assert_eq!(pdu.as_slice(), &[0x02, 0x02, 0xAC, 0x1B]);
    }

    #[test]
    fn test_read_holding_response_bytes() {
        let pdu = encode_response(&ModbusResponse::ReadHoldingRegisters(vec![0; 5])).unwrap();
        assert_eq!(pdu.as_slice(), &[0x03, 0x0A, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(decode_request(&[0x07]), Err(ModbusException::IllegalFunction));
        assert_eq!(decode_request(&[0x2B, 0x0D, 0x01, 0x00]), Err(ModbusException::IllegalFunction));
    }

    #[test]
    fn test_truncated_and_trailing() {
        assert_eq!(decode_request(&[0x03, 0x00, 0x00, 0x00]), Err(ModbusException::IllegalDataValue));
        assert_eq!(
            decode_request(&[0x03, 0x00, 0x00, 0x00, 0x01, 0x00]),
            Err(ModbusException::IllegalDataValue)
        );
        assert_eq!(decode_request(&[]), Err(ModbusException::IllegalDataValue));
    }

    #[test]
    fn test_quantity_limits() {
        assert_eq!(decode_request(&[0x03, 0x00, 0x00, 0x00, 0x00]), Err(ModbusException::IllegalDataValue));
        assert_eq!(decode_request(&[0x03, 0x00, 0x00, 0x00, 0x7E]), Err(ModbusException::IllegalDataValue));
        assert!(decode_request(&[0x03, 0x00, 0x00, 0x00, 0x7D]).is_ok());
        assert_eq!(decode_request(&[0x01, 0x00, 0x00, 0x07, 0xD1]), Err(ModbusException::IllegalDataValue));
    }

    #[test]
    fn test_address_overflow() {
        assert_eq!(
            decode_request(&[0x03, 0xFF, 0xFF, 0x00, 0x02]),
            Err(ModbusException::IllegalDataAddress)
        );
        assert!(decode_request(&[0x03, 0xFF, 0xFF, 0x00, 0x01]).is_ok());
    }

    #[test]
    fn test_invalid_coil_value() {
        assert_eq!(
            decode_request(&[0x05, 0x00, 0x01, 0x12, 0x34]),
            Err(ModbusException::IllegalDataValue)
        );
    }

    #[test]
    fn test_byte_count_mismatch() {
        // Declared byte count 4, only 2 bytes follow
        assert_eq!(
            decode_request(&[0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x01]),
            Err(ModbusException::IllegalDataValue)
        );
        // Byte count does not match quantity
        assert_eq!(
            decode_request(&[0x10, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, 0x01]),
            Err(ModbusException::IllegalDataValue)
        );
        // 9 coils need 2 bytes
        assert_eq!(
            decode_request(&[0x0F, 0x00, 0x00, 0x00, 0x09, 0x01, 0xFF]),
            Err(ModbusException::IllegalDataValue)
        );
    }

    #[test]
    fn test_decode_exception_response() {
        let request = ModbusRequest::ReadHoldingRegisters { address: 95, quantity: 10 };
        let pdu = encode_exception(0x03, ModbusException::IllegalDataAddress);
        assert_eq!(pdu.as_slice(), &[0x83, 0x02]);

        let err = decode_response(&request, pdu.as_slice()).unwrap_err();
        assert_eq!(err.as_exception(), Some(ModbusException::IllegalDataAddress));
    }

    #[test]
    fn test_decode_response_mismatch() {
        let request = ModbusRequest::ReadHoldingRegisters { address: 0, quantity: 2 };
        assert!(matches!(
            decode_response(&request, &[0x04, 0x04, 0, 0, 0, 0]),
            Err(ModbusError::Protocol { .. })
        ));
        assert!(matches!(
            decode_response(&request, &[0x03, 0x02, 0, 0]),
            Err(ModbusError::InvalidData { .. })
        ));
    }
}
