//! Fuzz target: `BleUuid::parse` and `hex_to_int`
//!
//! Arbitrary strings must never panic the UUID parser, and anything it
//! accepts must round-trip through its canonical byte form.
//!
//! cargo fuzz run fuzz_uuid_parse

#![no_main]

use blinkup::hex::{hex_to_int, BleUuid};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = core::str::from_utf8(data) else { return };

    let _ = hex_to_int(s);

    if let Ok(uuid) = BleUuid::parse(s) {
        let be = uuid.to_be_bytes();
        assert_eq!(be.len(), uuid.byte_len());
        let mut le = uuid.to_le_bytes();
        le.reverse();
        assert_eq!(be, le);
    }
});
