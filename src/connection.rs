//! # Connection Handler
//!
//! One handler per accepted TCP connection:
//!
//! ```text
//! AwaitingFrame -> Processing -> Responding -> AwaitingFrame ...
//!       |                             |
//!       +-----------> Closed <--------+
//! ```
//!
//! Anything wrong with a request (unknown function, bad address, bad value)
//! is answered with an exception response and the loop continues. Only a
//! transport failure closes the connection: peer disconnect, malformed
//! MBAP header, I/O error, idle timeout or server shutdown.

use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, warn};

use crate::codec::{decode_request, encode_exception, encode_response};
use crate::config::ServerConfig;
use crate::error::{ModbusError, ModbusException, ModbusResult};
use crate::identity::ServerIdentity;
use crate::pdu::ModbusPdu;
use crate::protocol::{ModbusRequest, ModbusResponse, UnitId};
use crate::server::{ServerCounters, ShutdownSignal};
use crate::store::{RegisterStore, Table};
use crate::transport::{MbapFrame, MbapFramer};

/// Handler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingFrame,
    Processing,
    Responding,
    Closed,
}

/// Per-request context, discarded once the response is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionContext {
    /// Echoed back so the client can correlate replies
    pub transaction_id: u16,
    /// Echoed back unchanged, even when it differs from the configured unit
    pub unit_id: UnitId,
    pub function_code: u8,
}

impl TransactionContext {
    fn from_frame(frame: &MbapFrame) -> Self {
        Self {
            transaction_id: frame.transaction_id,
            unit_id: frame.unit_id,
            function_code: frame.pdu.first().copied().unwrap_or(0),
        }
    }
}

/// Execute a decoded request against the store.
pub fn dispatch(
    store: &RegisterStore,
    identity: &ServerIdentity,
    request: ModbusRequest,
) -> Result<ModbusResponse, ModbusException> {
    match request {
        ModbusRequest::ReadCoils { address, quantity } => store
            .read_bits(Table::Coils, address, quantity as usize)
            .map(ModbusResponse::ReadCoils),
        ModbusRequest::ReadDiscreteInputs { address, quantity } => store
            .read_bits(Table::DiscreteInputs, address, quantity as usize)
            .map(ModbusResponse::ReadDiscreteInputs),
        ModbusRequest::ReadHoldingRegisters { address, quantity } => store
            .read(Table::HoldingRegisters, address, quantity as usize)
            .map(ModbusResponse::ReadHoldingRegisters),
        ModbusRequest::ReadInputRegisters { address, quantity } => store
            .read(Table::InputRegisters, address, quantity as usize)
            .map(ModbusResponse::ReadInputRegisters),
        ModbusRequest::WriteSingleCoil { address, value } => {
            store.write_bits(Table::Coils, address, &[value])?;
            Ok(ModbusResponse::WriteSingleCoil { address, value })
        }
        ModbusRequest::WriteSingleRegister { address, value } => {
            store.write(Table::HoldingRegisters, address, &[value])?;
            Ok(ModbusResponse::WriteSingleRegister { address, value })
        }
        ModbusRequest::WriteMultipleCoils { address, values } => {
            store.write_bits(Table::Coils, address, &values)?;
            Ok(ModbusResponse::WriteMultipleCoils {
                address,
                quantity: values.len() as u16,
            })
        }
        ModbusRequest::WriteMultipleRegisters { address, values } => {
            store.write(Table::HoldingRegisters, address, &values)?;
            Ok(ModbusResponse::WriteMultipleRegisters {
                address,
                quantity: values.len() as u16,
            })
        }
        ModbusRequest::ReadWriteMultipleRegisters {
            read_address,
            read_quantity,
            write_address,
            values,
        } => store
            .write_read_registers(write_address, &values, read_address, read_quantity as usize)
            .map(ModbusResponse::ReadWriteMultipleRegisters),
        ModbusRequest::ReadDeviceIdentification {
            read_code,
            object_id,
        } => identity
            .read(read_code, object_id)
            .map(ModbusResponse::ReadDeviceIdentification),
    }
}

/// Decode, execute and encode one request PDU.
///
/// Always produces a response PDU; failures become exception responses.
pub fn process_pdu(store: &RegisterStore, identity: &ServerIdentity, pdu: &[u8]) -> ModbusPdu {
    let fc = pdu.first().copied().unwrap_or(0);
    let response = match decode_request(pdu).and_then(|req| dispatch(store, identity, req)) {
        Ok(response) => response,
        Err(exception) => {
            debug!(
                "FC 0x{:02X} ({}) rejected: {}",
                fc,
                ModbusPdu::function_code_description(fc),
                exception
            );
            return encode_exception(fc, exception);
        }
    };

    match encode_response(&response) {
        Ok(pdu) => pdu,
        Err(e) => {
            error!("Failed to encode response for FC 0x{:02X}: {}", fc, e);
            encode_exception(fc, ModbusException::ServerDeviceFailure)
        }
    }
}

/// Serves one connection until it closes.
pub struct ConnectionHandler<S> {
    framer: MbapFramer<S>,
    store: RegisterStore,
    identity: Arc<ServerIdentity>,
    unit_id: UnitId,
    idle_timeout: Option<Duration>,
    counters: Arc<ServerCounters>,
    shutdown: Option<ShutdownSignal>,
    state: ConnectionState,
    reported_read: u64,
    reported_written: u64,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Handler for one accepted stream, using `config` for the idle timeout and unit id
    pub fn new(stream: S, store: RegisterStore, identity: Arc<ServerIdentity>, config: &ServerConfig) -> Self {
        Self {
            framer: MbapFramer::new(stream),
            store,
            identity,
            unit_id: config.unit_id,
            idle_timeout: config.idle_timeout(),
            counters: Arc::new(ServerCounters::default()),
            shutdown: None,
            state: ConnectionState::AwaitingFrame,
            reported_read: 0,
            reported_written: 0,
        }
    }

    /// Report into shared server counters
    pub fn with_counters(mut self, counters: Arc<ServerCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Close the connection when the server shuts down
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Serve requests until the connection closes.
    ///
    /// `Ok(())` for an orderly close (peer disconnect between frames or
    /// server shutdown). Any error has already closed the connection.
    pub async fn run(mut self) -> ModbusResult<()> {
        let result = self.serve().await;
        let last_state = std::mem::replace(&mut self.state, ConnectionState::Closed);
        self.report_bytes();

        match &result {
            Ok(()) => debug!("Connection closed while {:?}", last_state),
            Err(ModbusError::Timeout { operation, timeout_ms }) => {
                warn!("Timed out {} after {}ms, closing", operation, timeout_ms)
            }
            Err(e) if matches!(e, ModbusError::Protocol { .. } | ModbusError::Frame { .. }) => {
                self.counters.frames_rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Rejected frame, closing connection: {}", e)
            }
            Err(e) => debug!("Connection closed while {:?}: {}", last_state, e),
        }
        let _ = self.framer.shutdown().await;
        result
    }

    async fn serve(&mut self) -> ModbusResult<()> {
        loop {
            self.state = ConnectionState::AwaitingFrame;
            let Some(frame) = self.next_frame().await? else {
                return Ok(());
            };

            self.state = ConnectionState::Processing;
            let ctx = TransactionContext::from_frame(&frame);
            if ctx.unit_id != self.unit_id {
                debug!(
                    "Unit id {} differs from configured {}, serving FC 0x{:02X} anyway",
                    ctx.unit_id, self.unit_id, ctx.function_code
                );
            }
            let response = process_pdu(&self.store, &self.identity, &frame.pdu);
            self.counters.requests.fetch_add(1, Ordering::Relaxed);
            if response.is_exception() {
                self.counters.exceptions.fetch_add(1, Ordering::Relaxed);
            }

            self.state = ConnectionState::Responding;
            let write = self
                .framer
                .write_frame(ctx.transaction_id, ctx.unit_id, response.as_slice());
            // A peer that stops reading blocks the write; bound it like a read
            if guarded(write, "sending response", self.idle_timeout, self.shutdown.as_mut())
                .await?
                .is_none()
            {
                return Ok(());
            }
            self.report_bytes();
        }
    }

    async fn next_frame(&mut self) -> ModbusResult<Option<MbapFrame>> {
        let read = self.framer.read_frame();
        let frame = guarded(read, "waiting for request", self.idle_timeout, self.shutdown.as_mut()).await?;
        Ok(frame.flatten())
    }

    /// Add bytes moved since the last report to the server counters.
    fn report_bytes(&mut self) {
        let read = self.framer.bytes_read();
        let written = self.framer.bytes_written();
        self.counters
            .bytes_received
            .fetch_add(read - self.reported_read, Ordering::Relaxed);
        self.counters
            .bytes_sent
            .fetch_add(written - self.reported_written, Ordering::Relaxed);
        self.reported_read = read;
        self.reported_written = written;
    }
}

/// Run one transport operation under the idle timeout, giving up early
/// when the server shuts down. `Ok(None)` means shutdown won.
async fn guarded<T>(
    operation: impl Future<Output = ModbusResult<T>>,
    name: &'static str,
    limit: Option<Duration>,
    shutdown: Option<&mut ShutdownSignal>,
) -> ModbusResult<Option<T>> {
    let bounded = async move {
        match limit {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| ModbusError::timeout(name, limit.as_millis() as u64))?,
            None => operation.await,
        }
    };

    match shutdown {
        Some(shutdown) => tokio::select! {
            result = bounded => result.map(Some),
            _ = shutdown.wait() => {
                debug!("Server shutting down, closing connection");
                Ok(None)
            }
        },
        None => bounded.await.map(Some),
    }
}
