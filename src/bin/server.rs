//! Floor Modbus Server
//!
//! Serves zero-filled tables until Ctrl-C.
//!
//! Usage: cargo run --bin modbus-server [address:port]
//! Example: RUST_LOG=debug cargo run --bin modbus-server 127.0.0.1:5020

use floor_modbus::{logging, ModbusError, ModbusResult, ModbusTcpServer, ServerConfig};

fn parse_listen_address(arg: &str) -> ModbusResult<(String, u16)> {
    let (host, port) = arg
        .rsplit_once(':')
        .ok_or_else(|| ModbusError::configuration(format!("Expected ADDRESS:PORT, got '{}'", arg)))?;
    let port = port
        .parse()
        .map_err(|e| ModbusError::configuration(format!("Invalid port '{}': {}", port, e)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host.to_string(), port))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("info")?;

    let mut config = ServerConfig::new();
    if let Some(arg) = std::env::args().nth(1) {
        let (address, port) = parse_listen_address(&arg)?;
        config = config.with_address(address).with_port(port);
    }

    let server = ModbusTcpServer::bind(config).await?;
    println!("{}", floor_modbus::info());
    println!("Listening on {}", server.local_addr());

    let handle = server.spawn();
    tokio::signal::ctrl_c().await?;

    let stats = handle.stats();
    handle.shutdown().await?;
    println!(
        "Served {} requests ({} exceptions) over {} connections in {:?}",
        stats.requests, stats.exceptions, stats.connections_accepted, stats.uptime
    );
    Ok(())
}
