//! Modbus TCP client
//!
//! A lean master used by the probe tool and the integration tests. One
//! request is in flight at a time; responses are matched by transaction id.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use floor_modbus::{ModbusTcpClient, ModbusResult};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let mut client = ModbusTcpClient::connect("127.0.0.1:502", Duration::from_secs(5)).await?;
//!
//!     // Write holding register 0 on unit 1, then read it back
//!     client.write_single_register(1, 0, 0x1234).await?;
//!     let registers = client.read_holding_registers(1, 0, 1).await?;
//!     println!("Registers: {:?}", registers);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::codec::{decode_response, encode_request};
use crate::error::{ModbusError, ModbusResult};
use crate::identity::DeviceIdentification;
use crate::protocol::{ModbusRequest, ModbusResponse, UnitId};
use crate::transport::MbapFramer;

/// Modbus TCP master over any byte stream (a [`TcpStream`] by default)
pub struct ModbusTcpClient<S = TcpStream> {
    framer: MbapFramer<S>,
    timeout: Duration,
    next_transaction_id: u16,
}

impl ModbusTcpClient<TcpStream> {
    /// Connect to `addr` (e.g. `"127.0.0.1:502"`).
    ///
    /// `timeout` bounds the connect and every request/response exchange.
    pub async fn connect(addr: &str, timeout: Duration) -> ModbusResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ModbusError::timeout(format!("connect to {}", addr), timeout.as_millis() as u64))?
            .map_err(|e| ModbusError::connection(format!("Failed to connect to {}: {}", addr, e)))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        debug!("Connected to {}", addr);
        Ok(Self::from_stream(stream, timeout))
    }
}

impl<S> ModbusTcpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected stream
    pub fn from_stream(stream: S, timeout: Duration) -> Self {
        Self {
            framer: MbapFramer::new(stream),
            timeout,
            next_transaction_id: 1,
        }
    }

    fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    /// Send one request and wait for its response.
    ///
    /// Exception responses come back as [`ModbusError::Exception`].
    pub async fn execute(&mut self, unit_id: UnitId, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        let pdu = encode_request(request)?;
        let transaction_id = self.next_transaction_id();
        let timeout = self.timeout;
        let framer = &mut self.framer;

        let exchange = async move {
            framer.write_frame(transaction_id, unit_id, pdu.as_slice()).await?;
            loop {
                let frame = framer
                    .read_frame()
                    .await?
                    .ok_or_else(|| ModbusError::connection("Server closed the connection"))?;
                if frame.transaction_id != transaction_id {
                    // Late reply to an earlier request that timed out
                    warn!(
                        "Discarding response with transaction id {} (expected {})",
                        frame.transaction_id, transaction_id
                    );
                    continue;
                }
                if frame.unit_id != unit_id {
                    return Err(ModbusError::protocol(format!(
                        "Unit id mismatch: expected {}, got {}",
                        unit_id, frame.unit_id
                    )));
                }
                return decode_response(request, &frame.pdu);
            }
        };

        tokio::time::timeout(timeout, exchange).await.map_err(|_| {
            ModbusError::timeout(
                format!("{} response", request.function()),
                timeout.as_millis() as u64,
            )
        })?
    }

    /// Read coils (function code 0x01)
    pub async fn read_coils(&mut self, unit_id: UnitId, address: u16, quantity: u16) -> ModbusResult<Vec<bool>> {
        match self.execute(unit_id, &ModbusRequest::ReadCoils { address, quantity }).await? {
            ModbusResponse::ReadCoils(bits) => Ok(bits),
            other => Err(unexpected(other)),
        }
    }

    /// Read discrete inputs (function code 0x02)
    pub async fn read_discrete_inputs(
        &mut self,
        unit_id: UnitId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<bool>> {
        let request = ModbusRequest::ReadDiscreteInputs { address, quantity };
        match self.execute(unit_id, &request).await? {
            ModbusResponse::ReadDiscreteInputs(bits) => Ok(bits),
            other => Err(unexpected(other)),
        }
    }

    /// Read holding registers (function code 0x03)
    pub async fn read_holding_registers(
        &mut self,
        unit_id: UnitId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        let request = ModbusRequest::ReadHoldingRegisters { address, quantity };
        match self.execute(unit_id, &request).await? {
            ModbusResponse::ReadHoldingRegisters(values) => Ok(values),
            other => Err(unexpected(other)),
        }
    }

    /// Read input registers (function code 0x04)
    pub async fn read_input_registers(
        &mut self,
        unit_id: UnitId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        let request = ModbusRequest::ReadInputRegisters { address, quantity };
        match self.execute(unit_id, &request).await? {
            ModbusResponse::ReadInputRegisters(values) => Ok(values),
            other => Err(unexpected(other)),
        }
    }

    /// Write single coil (function code 0x05)
    pub async fn write_single_coil(&mut self, unit_id: UnitId, address: u16, value: bool) -> ModbusResult<()> {
        let request = ModbusRequest::WriteSingleCoil { address, value };
        match self.execute(unit_id, &request).await? {
            ModbusResponse::WriteSingleCoil { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Write single register (function code 0x06)
    pub async fn write_single_register(&mut self, unit_id: UnitId, address: u16, value: u16) -> ModbusResult<()> {
        let request = ModbusRequest::WriteSingleRegister { address, value };
        match self.execute(unit_id, &request).await? {
            ModbusResponse::WriteSingleRegister { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Write multiple coils (function code 0x0F)
    pub async fn write_multiple_coils(&mut self, unit_id: UnitId, address: u16, values: &[bool]) -> ModbusResult<()> {
        let request = ModbusRequest::WriteMultipleCoils {
            address,
            values: values.to_vec(),
        };
        match self.execute(unit_id, &request).await? {
            ModbusResponse::WriteMultipleCoils { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Write multiple registers (function code 0x10)
    pub async fn write_multiple_registers(
        &mut self,
        unit_id: UnitId,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<()> {
        let request = ModbusRequest::WriteMultipleRegisters {
            address,
            values: values.to_vec(),
        };
        match self.execute(unit_id, &request).await? {
            ModbusResponse::WriteMultipleRegisters { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Read/write multiple registers (function code 0x17).
    ///
    /// The write happens before the read.
    pub async fn read_write_multiple_registers(
        &mut self,
        unit_id: UnitId,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        values: &[u16],
    ) -> ModbusResult<Vec<u16>> {
        let request = ModbusRequest::ReadWriteMultipleRegisters {
            read_address,
            read_quantity,
            write_address,
            values: values.to_vec(),
        };
        match self.execute(unit_id, &request).await? {
            ModbusResponse::ReadWriteMultipleRegisters(values) => Ok(values),
            other => Err(unexpected(other)),
        }
    }

    /// Read device identification (function code 0x2B / MEI 0x0E)
    pub async fn read_device_identification(
        &mut self,
        unit_id: UnitId,
        read_code: u8,
        object_id: u8,
    ) -> ModbusResult<DeviceIdentification> {
        let request = ModbusRequest::ReadDeviceIdentification { read_code, object_id };
        match self.execute(unit_id, &request).await? {
            ModbusResponse::ReadDeviceIdentification(identification) => Ok(identification),
            other => Err(unexpected(other)),
        }
    }

    /// Shut down the write half of the connection
    pub async fn close(&mut self) -> ModbusResult<()> {
        self.framer.shutdown().await
    }
}

fn unexpected(response: ModbusResponse) -> ModbusError {
    ModbusError::protocol(format!("Unexpected {} response", response.function()))
}
