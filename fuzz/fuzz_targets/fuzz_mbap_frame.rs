#![no_main]

use floor_modbus::transport::MbapHeader;
use libfuzzer_sys::fuzz_target;

// Header parsing must never panic and must only accept lengths that fit.
fuzz_target!(|data: &[u8]| {
    if let Ok(Some(header)) = MbapHeader::parse(data) {
        assert_eq!(header.protocol_id, 0);
        assert!(header.frame_len() <= floor_modbus::constants::MAX_FRAME_LEN);
        assert!(header.length >= 2);
    }
});
