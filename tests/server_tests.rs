//! End-to-end tests against a real listener on a loopback port

use std::time::Duration;

use floor_modbus::{
    ModbusError, ModbusException, ModbusTcpClient, ModbusTcpServer, RegisterStore, ServerConfig,
    ServerHandle, Table,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const TIMEOUT: Duration = Duration::from_secs(5);

fn test_config() -> ServerConfig {
    ServerConfig::new().with_address("127.0.0.1").with_port(0)
}

async fn start_server(config: ServerConfig) -> ServerHandle {
    ModbusTcpServer::bind(config).await.unwrap().spawn()
}

async fn connect(handle: &ServerHandle) -> ModbusTcpClient {
    ModbusTcpClient::connect(&handle.local_addr().to_string(), TIMEOUT)
        .await
        .unwrap()
}

/// Send raw bytes and read back exactly `expected_len` bytes
async fn raw_exchange(stream: &mut TcpStream, request: &[u8], expected_len: usize) -> Vec<u8> {
    stream.write_all(request).await.unwrap();
    let mut response = vec![0u8; expected_len];
    tokio::time::timeout(TIMEOUT, stream.read_exact(&mut response))
        .await
        .unwrap()
        .unwrap();
    response
}

#[tokio::test]
async fn test_read_zeroed_holding_registers() {
    let handle = start_server(test_config()).await;
    let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();

    let response = raw_exchange(
        &mut stream,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x05],
        19,
    )
    .await;
    assert_eq!(
        response,
        vec![
            0x00, 0x01, 0x00, 0x00, 0x00, 0x0D, 0x01, 0x03, 0x0A, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0
        ]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_write_then_read_across_connections() {
    let handle = start_server(test_config()).await;

    let mut writer = connect(&handle).await;
    writer.write_single_register(1, 0, 42).await.unwrap();

    let mut reader = connect(&handle).await;
    assert_eq!(reader.read_holding_registers(1, 0, 1).await.unwrap(), vec![42]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_out_of_range_keeps_connection_open() {
    let handle = start_server(test_config()).await;
    let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();

    let response = raw_exchange(
        &mut stream,
        &[0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x5F, 0x00, 0x0A],
        9,
    )
    .await;
    assert_eq!(response, vec![0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x02]);

    // Same connection still serves requests
    let response = raw_exchange(
        &mut stream,
        &[0x00, 0x08, 0x00, 0x00, 0x00, 0x06, 0x01, 0x04, 0x00, 0x00, 0x00, 0x01],
        11,
    )
    .await;
    assert_eq!(response, vec![0x00, 0x08, 0x00, 0x00, 0x00, 0x05, 0x01, 0x04, 0x02, 0x00, 0x00]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_client_sees_exceptions() {
    let handle = start_server(test_config()).await;
    let mut client = connect(&handle).await;

    let err = client.read_holding_registers(1, 95, 10).await.unwrap_err();
    assert!(matches!(
        err,
        ModbusError::Exception {
            function: 0x03,
            exception: ModbusException::IllegalDataAddress
        }
    ));

    let err = client.read_input_registers(1, 0, 126).await.unwrap_err();
    assert_eq!(err.as_exception(), Some(ModbusException::IllegalDataValue));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_split_frame_and_pipelining() {
    let handle = start_server(test_config()).await;
    let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();

    // One request split across two writes
    stream.write_all(&[0x00, 0x01, 0x00, 0x00, 0x00]).await.unwrap();
    stream.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let response = raw_exchange(&mut stream, &[0x06, 0x01, 0x06, 0x00, 0x02, 0x00, 0x07], 12).await;
    assert_eq!(
        response,
        vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x02, 0x00, 0x07]
    );

    // Two requests in a single write are answered in order
    let mut batch = vec![0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x02, 0x00, 0x01];
    batch.extend_from_slice(&[0x00, 0x03, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01]);
    let response = raw_exchange(&mut stream, &batch, 11 + 10).await;
    assert_eq!(
        &response[..11],
        &[0x00, 0x02, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x07]
    );
    assert_eq!(&response[11..], &[0x00, 0x03, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x00]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bad_protocol_id_closes_only_that_connection() {
    let handle = start_server(test_config()).await;

    let mut healthy = connect(&handle).await;
    healthy.write_single_register(1, 1, 7).await.unwrap();

    let mut bad = TcpStream::connect(handle.local_addr()).await.unwrap();
    bad.write_all(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01])
        .await
        .unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(TIMEOUT, bad.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    assert_eq!(healthy.read_holding_registers(1, 1, 1).await.unwrap(), vec![7]);
    assert_eq!(handle.stats().frames_rejected, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_writers_disjoint_ranges() {
    const CLIENTS: u16 = 8;
    const SPAN: u16 = 10;

    let handle = start_server(test_config()).await;
    let addr = handle.local_addr().to_string();

    let mut tasks = Vec::new();
    for client_id in 0..CLIENTS {
        let addr = addr.clone();
        tasks.push(tokio::spawn(async move {
            let mut client = ModbusTcpClient::connect(&addr, TIMEOUT).await.unwrap();
            let start = client_id * SPAN;
            let values: Vec<u16> = (0..SPAN).map(|i| client_id * 100 + i).collect();
            client.write_multiple_registers(1, start, &values).await.unwrap();
            client.close().await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let store = handle.store();
    for client_id in 0..CLIENTS {
        let start = client_id * SPAN;
        let expected: Vec<u16> = (0..SPAN).map(|i| client_id * 100 + i).collect();
        assert_eq!(
            store.read(Table::HoldingRegisters, start, SPAN as usize).unwrap(),
            expected
        );
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_seeded_store_and_identity() {
    let store = RegisterStore::new(50)
        .with_values(Table::InputRegisters, 0, &[230, 231])
        .unwrap()
        .with_values(Table::DiscreteInputs, 4, &[1])
        .unwrap();
    let config = test_config().with_table_capacity(50);
    let handle = ModbusTcpServer::bind_with_store(config, store)
        .await
        .unwrap()
        .spawn();
    let mut client = connect(&handle).await;

    assert_eq!(client.read_input_registers(1, 0, 2).await.unwrap(), vec![230, 231]);
    assert_eq!(
        client.read_discrete_inputs(1, 3, 3).await.unwrap(),
        vec![false, true, false]
    );

    let identification = client.read_device_identification(1, 0x01, 0x00).await.unwrap();
    let names: Vec<&str> = identification.objects.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(names, vec!["Python Server", "PYSRV", "1.0"]);

    let read = client
        .read_write_multiple_registers(1, 0, 3, 1, &[5, 6])
        .await
        .unwrap();
    assert_eq!(read, vec![0, 5, 6]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_foreign_unit_id_is_served() {
    let handle = start_server(test_config().with_unit_id(1)).await;
    let mut client = connect(&handle).await;

    client.write_single_coil(17, 3, true).await.unwrap();
    assert_eq!(
        client.read_coils(1, 0, 5).await.unwrap(),
        vec![false, false, false, true, false]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let handle = start_server(test_config()).await;
    let addr = handle.local_addr();
    let mut client = connect(&handle).await;

    handle.shutdown().await.unwrap();

    assert!(client.read_coils(1, 0, 1).await.is_err());
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let handle = start_server(test_config()).await;
    let port = handle.local_addr().port();

    let result = ModbusTcpServer::bind(test_config().with_port(port)).await;
    assert!(matches!(result, Err(ModbusError::Connection { .. })));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stats_track_traffic() {
    let handle = start_server(test_config()).await;
    let mut client = connect(&handle).await;

    client.write_single_register(1, 0, 1).await.unwrap();
    let _ = client.read_holding_registers(1, 200, 1).await;
    client.close().await.unwrap();

    // Let the handler observe the disconnect
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stats = handle.stats();
    assert_eq!(stats.connections_accepted, 1);
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.exceptions, 1);
    assert_eq!(stats.bytes_received, 24);
    assert_eq!(stats.bytes_sent, 12 + 9);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_with_client_not_reading() {
    let handle = start_server(test_config()).await;
    let stream = TcpStream::connect(handle.local_addr()).await.unwrap();
    let (_reader, mut writer) = stream.into_split();

    // Pipeline far more 100-register reads than the socket buffers can answer
    let requests: Vec<u8> = (0..20_000u32)
        .flat_map(|i| {
            let tid = (i as u16).to_be_bytes();
            [tid[0], tid[1], 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x64]
        })
        .collect();
    let flood = tokio::spawn(async move {
        let _ = writer.write_all(&requests).await;
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stopped = tokio::time::timeout(TIMEOUT, handle.shutdown()).await;
    assert!(matches!(stopped, Ok(Ok(()))));
    flood.abort();
}
