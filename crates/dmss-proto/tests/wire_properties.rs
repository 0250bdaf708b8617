//! Property-based tests for the DMSS wire formats.
//!
//! These verify that prologue and DHAV serialization is correct for ALL
//! valid inputs, not just specific examples. Uses proptest to generate
//! arbitrary packets and verify round-trip properties.

use dmss_proto::dhav::{
    self, ExtensionHeader, FixedHeader, PacketSpec, PACKET_TYPE_AUDIO, PACKET_TYPE_VIDEO_I,
    PACKET_TYPE_VIDEO_P,
};
use dmss_proto::{Command, Prologue};
use proptest::prelude::*;

/// Strategy for generating arbitrary commands
fn arbitrary_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Login),
        Just(Command::Nop),
        Just(Command::NopAck),
        Just(Command::DhavStream),
        Just(Command::LegacyStreamLink),
        Just(Command::Rpc),
        Just(Command::LegacyStreamStart),
    ]
}

/// Strategy for generating arbitrary prologues
fn arbitrary_prologue() -> impl Strategy<Value = Prologue> {
    (arbitrary_command(), 0u32..=Prologue::MAX_BODY_SIZE, any::<u32>(), any::<u8>()).prop_map(
        |(command, body_size, session_id, auth_result)| {
            let mut prologue = Prologue::new(command);
            prologue.set_body_size(body_size);
            prologue.set_session_id(session_id);
            prologue.set_auth_result(auth_result);
            prologue
        },
    )
}

/// Strategy for generating arbitrary DHAV packets (as encode inputs)
fn arbitrary_dhav() -> impl Strategy<Value = (u8, u16, u16, Vec<u8>, Vec<u8>)> {
    (
        prop_oneof![
            Just(PACKET_TYPE_VIDEO_I),
            Just(PACKET_TYPE_VIDEO_P),
            Just(PACKET_TYPE_AUDIO),
        ],
        any::<u16>(),
        any::<u16>(),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(|mut ext| {
            // Whole records only; the encoder requires 4-byte alignment
            ext.truncate(ext.len() / 4 * 4);
            ext
        }),
        prop::collection::vec(any::<u8>(), 0..512),
    )
}

#[test]
fn prop_prologue_round_trip() {
    proptest!(|(prologue in arbitrary_prologue())| {
        let bytes = prologue.to_bytes();
        let parsed = Prologue::from_bytes(&bytes).expect("should parse");

        // PROPERTY: round-trip must be identity
        prop_assert_eq!(&prologue, parsed);
        prop_assert_eq!(parsed.command(), prologue.command());
        prop_assert_eq!(parsed.body_size(), prologue.body_size());
        prop_assert_eq!(parsed.session_id(), prologue.session_id());
        prop_assert_eq!(parsed.auth_result(), prologue.auth_result());
    });
}

#[test]
fn prop_dhav_round_trip() {
    proptest!(|((packet_type, epoch, ts, extension, body) in arbitrary_dhav())| {
        let packet = dhav::encode_packet(&PacketSpec {
            packet_type,
            epoch,
            ts,
            extension: &extension,
            body: &body,
        });

        let header = FixedHeader::from_bytes(&packet).expect("should parse");
        prop_assert_eq!(header.packet_type(), packet_type);
        prop_assert_eq!(header.epoch(), epoch);
        prop_assert_eq!(header.ts(), ts);
        prop_assert_eq!(header.head_size() as usize, extension.len());
        prop_assert_eq!(header.body_size() as usize, body.len());
        prop_assert_eq!(header.total_size() as usize, packet.len());

        // PROPERTY: a freshly encoded packet always carries a valid trailer
        dhav::validate_trailer(&packet).expect("trailer should validate");

        // PROPERTY: the body slice comes back bit-identical
        let body_start = 24 + extension.len();
        prop_assert_eq!(&packet[body_start..body_start + body.len()], &body[..]);
    });
}

#[test]
fn prop_extension_find_matches_linear_scan() {
    proptest!(|(records in prop::collection::vec((1u8..=0xff, 0u32..0x0100_0000), 0..8),
                tag in 1u8..=0xff)| {
        let mut ext = Vec::new();
        for (record_tag, value) in &records {
            let word = (u32::from(*record_tag) << 24) | value;
            ext.extend_from_slice(&word.to_be_bytes());
        }

        let parsed = ExtensionHeader::parse(&ext);
        let expected = records.iter().find(|(t, _)| *t == tag).map(|(_, v)| *v);

        prop_assert_eq!(parsed.find(tag), expected);
    });
}

#[test]
fn prop_fixed_header_never_panics_on_garbage() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..64))| {
        // Must never panic, only return Ok or Err
        let _ = FixedHeader::from_bytes(&bytes);
        let _ = dhav::validate_trailer(&bytes);
        let _ = ExtensionHeader::parse(&bytes);
        let _ = Prologue::from_bytes(&bytes);
    });
}
