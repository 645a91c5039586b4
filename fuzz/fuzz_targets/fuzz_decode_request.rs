#![no_main]

use floor_modbus::connection::process_pdu;
use floor_modbus::{RegisterStore, ServerIdentity};
use libfuzzer_sys::fuzz_target;

// Any request PDU must produce a well-formed response that fits one frame.
fuzz_target!(|data: &[u8]| {
    let store = RegisterStore::new(256);
    let identity = ServerIdentity::default();

    let response = process_pdu(&store, &identity, data);
    assert!(!response.is_empty());
    assert!(response.len() <= floor_modbus::MAX_PDU_SIZE);
    if let Some(&fc) = data.first() {
        assert_eq!(response.function_code().map(|c| c & 0x7F), Some(fc & 0x7F));
    }
});
