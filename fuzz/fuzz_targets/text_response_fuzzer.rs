//! Fuzz target for control text response parsing.
//!
//! Key lookup and fault-code checking over arbitrary bytes: must never
//! panic, and any returned value slice must lie within the input.

#![no_main]

use dmss_proto::text;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for key in ["FaultCode:", "ConnectionID:", "TransactionID:", ""] {
        if let Some(value) = text::find_value(data, key) {
            assert!(value.len() <= data.len());
        }
    }

    let _ = text::require_fault_code_ok(data);
});
