#![no_main]

//! Fuzz target for StoredRecord decoding
//!
//! Feeds arbitrary bytes through the CBOR, JSON and auto-detecting decoders,
//! covering the legacy single-hash record shape as well.
//!
//! Run with: cargo +nightly fuzz run fuzz_record_decode

use libfuzzer_sys::fuzz_target;
use nearsight_core::StoredRecord;

fuzz_target!(|data: &[u8]| {
    let _ = StoredRecord::from_cbor(data);
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = StoredRecord::from_json(text);
    }

    // A decoded record must survive validation and re-encoding
    if let Ok(record) = StoredRecord::decode(data) {
        let _ = record.descriptor.validate(&Default::default());
        let _ = record.to_cbor();
    }
});
