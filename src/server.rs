//! # Modbus TCP Server
//!
//! Binds the listening socket, accepts connections and runs one
//! [`ConnectionHandler`] task per connection. All handlers share a single
//! [`RegisterStore`].
//!
//! # Lifecycle
//!
//! - [`ModbusTcpServer::bind`] fails synchronously if the port is taken or
//!   privileged. Nothing is accepted before it returns.
//! - [`ModbusTcpServer::run`] accepts until the [`ShutdownHandle`] fires,
//!   then drops the listener and tells open connections to close. Tasks
//!   still running after a short grace period are aborted.
//! - [`ModbusTcpServer::spawn`] runs the same loop on a background task.
//! - [`run_blocking`] owns a Tokio runtime, for hosts that are not async.
//!
//! ```rust,no_run
//! use floor_modbus::{ModbusTcpServer, ServerConfig, ModbusResult};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let config = ServerConfig::new().with_address("127.0.0.1").with_port(5020);
//!     let server = ModbusTcpServer::bind(config).await?;
//!     let handle = server.spawn();
//!
//!     // ... serve until the application exits
//!     handle.shutdown().await
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::connection::ConnectionHandler;
use crate::error::{ModbusError, ModbusResult};
use crate::identity::ServerIdentity;
use crate::store::RegisterStore;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How long shutdown waits for open connections before aborting them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Live counters shared by the listener and every handler
#[derive(Debug, Default)]
pub struct ServerCounters {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub requests: AtomicU64,
    pub exceptions: AtomicU64,
    pub frames_rejected: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
}

/// Decrements the active connection count when the handler task ends,
/// including by panic.
struct ActiveConnection(Arc<ServerCounters>);

impl ActiveConnection {
    fn open(counters: Arc<ServerCounters>) -> Self {
        counters.connections_accepted.fetch_add(1, Ordering::Relaxed);
        counters.active_connections.fetch_add(1, Ordering::Relaxed);
        Self(counters)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Server statistics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub requests: u64,
    pub exceptions: u64,
    pub frames_rejected: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub started_at: DateTime<Utc>,
    pub uptime: Duration,
}

impl ServerStats {
    fn snapshot(counters: &ServerCounters, started_at: DateTime<Utc>) -> Self {
        Self {
            connections_accepted: counters.connections_accepted.load(Ordering::Relaxed),
            active_connections: counters.active_connections.load(Ordering::Relaxed),
            requests: counters.requests.load(Ordering::Relaxed),
            exceptions: counters.exceptions.load(Ordering::Relaxed),
            frames_rejected: counters.frames_rejected.load(Ordering::Relaxed),
            bytes_received: counters.bytes_received.load(Ordering::Relaxed),
            bytes_sent: counters.bytes_sent.load(Ordering::Relaxed),
            started_at,
            uptime: (Utc::now() - started_at).to_std().unwrap_or_default(),
        }
    }
}

/// Triggers server shutdown. Clones share the same signal.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    /// Create a handle with shutdown not yet requested
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver side, resolved once shutdown is requested
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Waits for a [`ShutdownHandle`] to fire
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been requested. Cancel-safe.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Every handle is gone; nobody can request shutdown anymore
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Modbus TCP slave bound to a listening socket
pub struct ModbusTcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    store: RegisterStore,
    identity: Arc<ServerIdentity>,
    counters: Arc<ServerCounters>,
    shutdown: ShutdownHandle,
    started_at: DateTime<Utc>,
}

impl ModbusTcpServer {
    /// Bind with zero-filled tables of `config.table_capacity` entries.
    pub async fn bind(config: ServerConfig) -> ModbusResult<Self> {
        let store = RegisterStore::new(config.table_capacity);
        Self::bind_with_store(config, store).await
    }

    /// Bind serving an existing store (e.g. one pre-loaded by the host).
    pub async fn bind_with_store(config: ServerConfig, store: RegisterStore) -> ModbusResult<Self> {
        config.validate()?;
        if store.capacity() != config.table_capacity {
            return Err(ModbusError::configuration(format!(
                "store capacity {} does not match table_capacity {}",
                store.capacity(),
                config.table_capacity
            )));
        }

        let bind_address = config.bind_address();
        let listener = TcpListener::bind(&bind_address).await.map_err(|e| {
            ModbusError::connection(format!("Failed to bind to {}: {}", bind_address, e))
        })?;
        let local_addr = listener.local_addr()?;

        info!("Modbus TCP server listening on {}", local_addr);
        info!(
            "Unit id {}, {} entries per table, idle timeout {:?}",
            config.unit_id,
            config.table_capacity,
            config.idle_timeout()
        );

        Ok(Self {
            listener,
            local_addr,
            config,
            store,
            identity: Arc::new(ServerIdentity::default()),
            counters: Arc::new(ServerCounters::default()),
            shutdown: ShutdownHandle::new(),
            started_at: Utc::now(),
        })
    }

    /// Serve a custom identity for Read Device Identification
    pub fn with_identity(mut self, identity: ServerIdentity) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    /// Stop when `shutdown` fires instead of an internal handle
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Actual bound address (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the shared store
    pub fn store(&self) -> RegisterStore {
        self.store.clone()
    }

    /// Handle that stops the server when triggered
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Snapshot of the server counters
    pub fn stats(&self) -> ServerStats {
        ServerStats::snapshot(&self.counters, self.started_at)
    }

    /// Accept connections until shutdown is requested.
    pub async fn run(self) -> ModbusResult<()> {
        let Self {
            listener,
            config,
            store,
            identity,
            counters,
            shutdown,
            ..
        } = self;

        let mut signal = shutdown.signal();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = signal.wait() => {
                    info!("Shutdown requested, closing listener");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                        }
                        info!("Client connected: {}", peer);

                        let active = ActiveConnection::open(counters.clone());
                        let handler = ConnectionHandler::new(stream, store.clone(), identity.clone(), &config)
                            .with_counters(counters.clone())
                            .with_shutdown(shutdown.signal());

                        connections.spawn(
                            async move {
                                let _active = active;
                                let result = handler.run().await;
                                info!("Client disconnected");
                                result
                            }
                            .instrument(info_span!("connection", %peer)),
                        );
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    reap(joined);
                }
            }
        }

        drop(listener);
        let drain = async {
            while let Some(joined) = connections.join_next().await {
                reap(joined);
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!(
                "{} connections still open after {:?}, aborting",
                connections.len(),
                SHUTDOWN_GRACE
            );
            connections.shutdown().await;
        }
        info!("Modbus TCP server stopped");
        Ok(())
    }

    /// Run on a background task.
    pub fn spawn(self) -> ServerHandle {
        let local_addr = self.local_addr;
        let store = self.store.clone();
        let counters = self.counters.clone();
        let started_at = self.started_at;
        let shutdown = self.shutdown.clone();

        ServerHandle {
            local_addr,
            store,
            counters,
            started_at,
            shutdown,
            task: tokio::spawn(self.run()),
        }
    }
}

fn reap(joined: Result<ModbusResult<()>, JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Connection ended with error: {}", e),
        Err(e) if e.is_panic() => error!("Connection handler panicked: {}", e),
        Err(e) => debug!("Connection task cancelled: {}", e),
    }
}

/// Handle to a server running on a background task
pub struct ServerHandle {
    local_addr: SocketAddr,
    store: RegisterStore,
    counters: Arc<ServerCounters>,
    started_at: DateTime<Utc>,
    shutdown: ShutdownHandle,
    task: JoinHandle<ModbusResult<()>>,
}

impl ServerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle to the served tables
    pub fn store(&self) -> RegisterStore {
        self.store.clone()
    }

    /// Snapshot of the server counters
    pub fn stats(&self) -> ServerStats {
        ServerStats::snapshot(&self.counters, self.started_at)
    }

    /// Handle that stops the server when triggered
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stop the server and wait until every connection task has finished or been aborted.
    pub async fn shutdown(self) -> ModbusResult<()> {
        self.shutdown.shutdown();
        self.task
            .await
            .map_err(|e| ModbusError::connection(format!("Server task failed: {}", e)))?
    }
}

/// Build a runtime and serve on the calling thread until `shutdown` fires.
///
/// Bind failures are returned before anything is served.
pub fn run_blocking(config: ServerConfig, shutdown: ShutdownHandle) -> ModbusResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("modbus-server")
        .build()?;

    runtime.block_on(async move {
        ModbusTcpServer::bind(config)
            .await?
            .with_shutdown(shutdown)
            .run()
            .await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Table;
    use crate::transport::MbapFramer;
    use tokio::net::TcpStream;

    fn local_config() -> ServerConfig {
        ServerConfig::new().with_address("127.0.0.1").with_port(0)
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let handle = ShutdownHandle::new();
        let mut signal = handle.signal();
        assert!(!handle.is_shutdown());

        handle.shutdown();
        handle.shutdown();
        signal.wait().await;
        assert!(handle.is_shutdown());

        // Subscribers created after the fact resolve immediately
        handle.signal().wait().await;
    }

    #[tokio::test]
    async fn test_bind_port_in_use() {
        let first = ModbusTcpServer::bind(local_config()).await.unwrap();
        let port = first.local_addr().port();

        let second = ModbusTcpServer::bind(local_config().with_port(port)).await;
        assert!(matches!(second, Err(ModbusError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let result = ModbusTcpServer::bind(local_config().with_table_capacity(0)).await;
        assert!(matches!(result, Err(ModbusError::Configuration { .. })));

        let result = ModbusTcpServer::bind_with_store(local_config(), RegisterStore::new(10)).await;
        assert!(matches!(result, Err(ModbusError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let server = ModbusTcpServer::bind(local_config()).await.unwrap();
        let addr = server.local_addr();
        let handle = server.spawn();

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framer = MbapFramer::new(stream);
        framer.write_frame(1, 1, &[0x06, 0x00, 0x04, 0x00, 0x2A]).await.unwrap();
        let reply = framer.read_frame().await.unwrap().unwrap();
        assert_eq!(&reply.pdu[..], &[0x06, 0x00, 0x04, 0x00, 0x2A]);
        assert_eq!(handle.store().read(Table::HoldingRegisters, 4, 1).unwrap(), vec![42]);

        let stats = handle.stats();
        assert_eq!(stats.connections_accepted, 1);
        assert_eq!(stats.requests, 1);

        handle.shutdown().await.unwrap();

        // Open connection is closed by shutdown
        assert!(framer.read_frame().await.unwrap().is_none());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[test]
    fn test_run_blocking_reports_bind_failure() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let result = run_blocking(local_config().with_port(port), ShutdownHandle::new());
        assert!(matches!(result, Err(ModbusError::Connection { .. })));
    }

    #[test]
    fn test_run_blocking_stops_on_shutdown() {
        let shutdown = ShutdownHandle::new();
        let trigger = shutdown.clone();
        let worker = std::thread::spawn(move || run_blocking(local_config(), shutdown));

        std::thread::sleep(Duration::from_millis(100));
        trigger.shutdown();
        assert!(worker.join().unwrap().is_ok());
    }
}
