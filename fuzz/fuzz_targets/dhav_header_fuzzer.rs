//! Fuzz target for DHAV header and trailer parsing.
//!
//! Feeds arbitrary byte sequences to the fixed-header, trailer and
//! extension parsers to find crashes, integer overflows in size
//! arithmetic, or buffer over-reads.
//!
//! The parsers should NEVER panic. All invalid inputs must return an
//! error (or, for the extension header, an empty record set).

#![no_main]

use dmss_proto::dhav::{validate_trailer, ExtensionHeader, FixedHeader};
use dmss_proto::Prologue;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = FixedHeader::from_bytes(data) {
        // Derived sizes must stay internally consistent.
        assert!(header.total_size() >= 32);
        assert_eq!(
            header.body_size(),
            header.total_size() - 32 - u32::from(header.head_size())
        );
    }

    let _ = validate_trailer(data);
    let extension = ExtensionHeader::parse(data);
    let _ = extension.video_codec_code();
    let _ = extension.audio_info();
    let _ = Prologue::from_bytes(data);
});
