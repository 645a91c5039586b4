//! # MBAP Framer
//!
//! Modbus TCP wraps every PDU in a 7-byte MBAP header:
//!
//! ```text
//! +----------------+-------------+--------+---------+----------------+
//! | Transaction ID | Protocol ID | Length | Unit ID |      PDU       |
//! |    2 bytes     |   2 bytes   | 2 bytes| 1 byte  | Length-1 bytes |
//! +----------------+-------------+--------+---------+----------------+
//! ```
//!
//! TCP delivers a byte stream, not messages. [`MbapFramer::read_frame`]
//! accumulates reads in a buffer until the full declared length has
//! arrived, and keeps any bytes past the end of one frame for the next
//! call.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::constants::{
    FRAME_BUFFER_SIZE, MAX_MBAP_LENGTH, MAX_PDU_SIZE, MBAP_HEADER_LEN, MBAP_LENGTH_OFFSET,
    MBAP_PROTOCOL_ID, MIN_MBAP_LENGTH,
};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::UnitId;

/// Parsed MBAP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Byte count of unit id + PDU
    pub length: u16,
    pub unit_id: UnitId,
}

impl MbapHeader {
    /// Parse the first 7 bytes of `buf`.
    ///
    /// Returns `Ok(None)` when fewer than 7 bytes are available. A
    /// non-zero protocol id or a length outside 2..=254 is an error.
    pub fn parse(buf: &[u8]) -> ModbusResult<Option<Self>> {
        if buf.len() < MBAP_HEADER_LEN {
            return Ok(None);
        }
        let header = Self {
            transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
            protocol_id: u16::from_be_bytes([buf[2], buf[3]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
            unit_id: buf[6],
        };

        if header.protocol_id != MBAP_PROTOCOL_ID {
            return Err(ModbusError::protocol(format!(
                "Invalid protocol id {} (transaction {})",
                header.protocol_id, header.transaction_id
            )));
        }
        let length = header.length as usize;
        if !(MIN_MBAP_LENGTH..=MAX_MBAP_LENGTH).contains(&length) {
            return Err(ModbusError::frame(format!(
                "Invalid MBAP length {} (expected {}-{})",
                length, MIN_MBAP_LENGTH, MAX_MBAP_LENGTH
            )));
        }
        Ok(Some(header))
    }

    /// Size of the whole frame on the wire
    #[inline]
    pub fn frame_len(&self) -> usize {
        MBAP_LENGTH_OFFSET + self.length as usize
    }
}

/// One complete Modbus TCP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbapFrame {
    pub transaction_id: u16,
    pub unit_id: UnitId,
    pub pdu: Bytes,
}

/// Build a frame around `pdu`. The length field is computed here.
pub fn encode_frame(transaction_id: u16, unit_id: UnitId, pdu: &[u8]) -> ModbusResult<BytesMut> {
    if pdu.is_empty() || pdu.len() > MAX_PDU_SIZE {
        return Err(ModbusError::frame(format!(
            "PDU length {} out of range (1-{})",
            pdu.len(),
            MAX_PDU_SIZE
        )));
    }
    let mut buf = BytesMut::with_capacity(MBAP_HEADER_LEN + pdu.len());
    buf.put_u16(transaction_id);
    buf.put_u16(MBAP_PROTOCOL_ID);
    buf.put_u16((pdu.len() + 1) as u16);
    buf.put_u8(unit_id);
    buf.put_slice(pdu);
    Ok(buf)
}

/// Frames a byte stream into MBAP frames.
#[derive(Debug)]
pub struct MbapFramer<S> {
    stream: S,
    buffer: BytesMut,
    bytes_read: u64,
    bytes_written: u64,
}

impl<S> MbapFramer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream with an empty receive buffer
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(FRAME_BUFFER_SIZE),
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Wait for the next complete frame.
    ///
    /// Returns `Ok(None)` when the peer closes the stream between frames.
    /// A close in the middle of a frame is a [`ModbusError::Connection`].
    pub async fn read_frame(&mut self) -> ModbusResult<Option<MbapFrame>> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ModbusError::connection(format!(
                    "Stream closed with {} bytes of an incomplete frame",
                    self.buffer.len()
                )));
            }
            self.bytes_read += n as u64;
            trace!("Read {} bytes, {} buffered", n, self.buffer.len());
        }
    }

    fn parse_frame(&mut self) -> ModbusResult<Option<MbapFrame>> {
        let Some(header) = MbapHeader::parse(&self.buffer)? else {
            return Ok(None);
        };
        let frame_len = header.frame_len();
        if self.buffer.len() < frame_len {
            self.buffer.reserve(frame_len - self.buffer.len());
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(frame_len);
        frame.advance(MBAP_HEADER_LEN);
        debug!(
            "RX frame: tid={} unit={} pdu={:02X?}",
            header.transaction_id, header.unit_id, &frame[..]
        );
        Ok(Some(MbapFrame {
            transaction_id: header.transaction_id,
            unit_id: header.unit_id,
            pdu: frame.freeze(),
        }))
    }

    /// Frame `pdu` and write it out.
    pub async fn write_frame(&mut self, transaction_id: u16, unit_id: UnitId, pdu: &[u8]) -> ModbusResult<()> {
        let frame = encode_frame(transaction_id, unit_id, pdu)?;
        debug!("TX frame: tid={} unit={} pdu={:02X?}", transaction_id, unit_id, pdu);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        self.bytes_written += frame.len() as u64;
        Ok(())
    }

    /// Bytes read from the stream so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Bytes written to the stream so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Shut down the write half of the stream.
    pub async fn shutdown(&mut self) -> ModbusResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
