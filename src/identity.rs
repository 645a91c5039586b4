//! # Server Identity
//!
//! Static descriptor served through Read Device Identification
//! (FC 0x2B, MEI type 0x0E).
//!
//! | Object | Name | Category |
//! |--------|------|----------|
//! | 0x00 | VendorName | basic |
//! | 0x01 | ProductCode | basic |
//! | 0x02 | MajorMinorRevision | basic |
//! | 0x03 | VendorUrl | regular |
//! | 0x04 | ProductName | regular |
//! | 0x05 | ModelName | regular |
//!
//! Basic objects always exist. Regular objects exist only when non-empty.

use crate::constants::MAX_PDU_SIZE;
use crate::error::ModbusException;

/// Stream basic objects
pub const READ_CODE_BASIC: u8 = 0x01;
/// Stream regular objects
pub const READ_CODE_REGULAR: u8 = 0x02;
/// Stream extended objects (none are defined, served as regular)
pub const READ_CODE_EXTENDED: u8 = 0x03;
/// Access one object
pub const READ_CODE_SPECIFIC: u8 = 0x04;

/// Regular identification, stream and individual access
pub const CONFORMITY_LEVEL: u8 = 0x82;

const LAST_BASIC_OBJECT: u8 = 0x02;
const LAST_REGULAR_OBJECT: u8 = 0x05;

// FC + MEI + read code + conformity + more follows + next id + object count
const RESPONSE_HEADER_LEN: usize = 7;
// object id + object length
const OBJECT_HEADER_LEN: usize = 2;
const MAX_OBJECT_LEN: usize = MAX_PDU_SIZE - RESPONSE_HEADER_LEN - OBJECT_HEADER_LEN;

/// Read-only device descriptor with process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub vendor_name: String,
    pub product_code: String,
    pub major_minor_revision: String,
    pub vendor_url: String,
    pub product_name: String,
    pub model_name: String,
}

impl Default for ServerIdentity {
    fn default() -> Self {
        Self {
            vendor_name: "Python Server".to_string(),
            product_code: "PYSRV".to_string(),
            major_minor_revision: "1.0".to_string(),
            vendor_url: "http://github.com/riptideio/pymodbus/".to_string(),
            product_name: "Python Modbus Server".to_string(),
            model_name: "Modbus Server".to_string(),
        }
    }
}

/// One identification object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceObject {
    pub id: u8,
    pub value: String,
}

/// Read Device Identification response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentification {
    pub read_code: u8,
    pub conformity_level: u8,
    /// More objects remain; request again from `next_object_id`
    pub more_follows: bool,
    pub next_object_id: u8,
    pub objects: Vec<DeviceObject>,
}

impl ServerIdentity {
    /// Value of object `id`, if this identity defines it
    pub fn object(&self, id: u8) -> Option<&str> {
        let value = match id {
            0x00 => return Some(&self.vendor_name),
            0x01 => return Some(&self.product_code),
            0x02 => return Some(&self.major_minor_revision),
            0x03 => &self.vendor_url,
            0x04 => &self.product_name,
            0x05 => &self.model_name,
            _ => return None,
        };
        (!value.is_empty()).then_some(value.as_str())
    }

    /// Answer a Read Device Identification request.
    pub fn read(&self, read_code: u8, object_id: u8) -> Result<DeviceIdentification, ModbusException> {
        let last = match read_code {
            READ_CODE_BASIC => LAST_BASIC_OBJECT,
            READ_CODE_REGULAR | READ_CODE_EXTENDED => LAST_REGULAR_OBJECT,
            READ_CODE_SPECIFIC => {
                let value = self
                    .object(object_id)
                    .ok_or(ModbusException::IllegalDataAddress)?;
                return Ok(DeviceIdentification {
                    read_code,
                    conformity_level: CONFORMITY_LEVEL,
                    more_follows: false,
                    next_object_id: 0,
                    objects: vec![DeviceObject {
                        id: object_id,
                        value: clamp(value).to_string(),
                    }],
                });
            }
            _ => return Err(ModbusException::IllegalDataValue),
        };

        let start = if object_id <= last && self.object(object_id).is_some() {
            object_id
        } else {
            0
        };

        let mut response = DeviceIdentification {
            read_code,
            conformity_level: CONFORMITY_LEVEL,
            more_follows: false,
            next_object_id: 0,
            objects: Vec::new(),
        };
        let mut used = RESPONSE_HEADER_LEN;

        for id in start..=last {
            let Some(value) = self.object(id) else {
                continue;
            };
            let value = clamp(value);
            let needed = OBJECT_HEADER_LEN + value.len();
            if used + needed > MAX_PDU_SIZE {
                response.more_follows = true;
                response.next_object_id = id;
                break;
            }
            used += needed;
            response.objects.push(DeviceObject {
                id,
                value: value.to_string(),
            });
        }

        Ok(response)
    }
}

/// Longest prefix of `value` that fits in a single-object response,
/// cut on a character boundary.
fn clamp(value: &str) -> &str {
    if value.len() <= MAX_OBJECT_LEN {
        return value;
    }
    let mut end = MAX_OBJECT_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
