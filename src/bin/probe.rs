//! Floor Modbus Probe
//!
//! Writes each value to holding register 0 and reads it back.
//!
//! Usage: cargo run --bin modbus-probe <address:port> <value>...
//! Example: cargo run --bin modbus-probe 127.0.0.1:502 42 1000

use std::time::Duration;

use floor_modbus::{ModbusError, ModbusTcpClient};

const UNIT_ID: u8 = 1;
const REGISTER: u16 = 0;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let address = args
        .next()
        .ok_or_else(|| ModbusError::configuration("Usage: modbus-probe <address:port> <value>..."))?;
    let values = args
        .map(|arg| {
            arg.parse::<u16>()
                .map_err(|e| ModbusError::configuration(format!("Invalid value '{}': {}", arg, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut client = ModbusTcpClient::connect(&address, Duration::from_secs(5)).await?;
    println!("Connected to {}", address);

    for value in values {
        client.write_single_register(UNIT_ID, REGISTER, value).await?;
        println!("Wrote {} to holding register {}", value, REGISTER);

        let read = client.read_holding_registers(UNIT_ID, REGISTER, 1).await?;
        println!("Holding register {}: {:?}", REGISTER, read);
    }

    client.close().await?;
    Ok(())
}
