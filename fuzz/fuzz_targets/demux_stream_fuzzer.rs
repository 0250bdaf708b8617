//! Fuzz target for the DHAV demultiplexer.
//!
//! Replays arbitrary byte chunks as a sequence of `0xbc` carriers. The
//! demuxer must never panic, never emit a frame whose payload overruns
//! the bytes it was fed, and never let its adapter exceed the 16 MiB
//! bound plus one carrier.

#![no_main]

use std::time::Instant;

use bytes::Bytes;
use dmss_client::{Demuxer, Packet, StreamEvent};
use dmss_proto::Prologue;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|chunks: Vec<Vec<u8>>| {
    let mut demux = Demuxer::new();
    let now = Instant::now();

    for chunk in chunks {
        if chunk.len() > Prologue::MAX_BODY_SIZE as usize {
            continue;
        }

        let mut prologue = [0u8; Prologue::SIZE];
        prologue[0] = 0xbc;
        prologue[4..8].copy_from_slice(&(chunk.len() as u32).to_le_bytes());
        let packet = Packet {
            prologue: *Prologue::from_bytes(&prologue).unwrap(),
            body: Bytes::from(chunk),
        };

        demux.push_packet(&packet, now);

        let mut last_pts = None;
        while let Some(event) = demux.poll_event() {
            if let StreamEvent::Frame(frame) = event {
                // Emitted PTS never decreases within one push.
                if let Some(last) = last_pts {
                    assert!(frame.pts >= last);
                }
                last_pts = Some(frame.pts);
            }
        }
    }
});
