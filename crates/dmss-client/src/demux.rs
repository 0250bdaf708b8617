//! DHAV demultiplexer.
//!
//! Consumes the bodies of `0xbc` outer packets and recovers complete
//! DHAV packets from them, resynchronizing on corruption. Emits
//! [`StreamEvent`]s: stream descriptions when a codec first appears or
//! changes, one frame per recovered packet, and warnings for the
//! recoverable failure modes.
//!
//! # Buffering
//!
//! The demultiplexer owns an append-only byte buffer (its adapter). The
//! first chunk of a DHAV packet is pushed *with* its 32-byte outer
//! prologue; continuation chunks are pushed body-only. The parser
//! therefore treats every buffered packet as starting 32 bytes in, and
//! consumes `32 + total_size` bytes per recovered frame.
//!
//! # Failure semantics
//!
//! - magic not found in the buffered bytes, or a corrupt trailer: warn,
//!   drop the whole buffer, and resynchronize on the next DHAV-bearing
//!   outer packet
//! - unknown codec or rate: warn and skip that packet only
//! - short buffer: wait for more bytes (no error)
//!
//! The buffer is bounded at 16 MiB; exceeding it means a runaway or
//! hostile stream and is treated like corruption.

use std::{
    collections::VecDeque,
    ops::Sub,
    time::{Duration, Instant},
};

use bytes::{Buf, Bytes, BytesMut};
use dmss_proto::dhav::{
    self, AudioCodec, AudioRate, ExtensionHeader, FixedHeader, PacketKind, VideoCodec,
};
use dmss_proto::{Command, Prologue};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{timestamp::PtsTracker, wire::Packet};

/// Byte budget for the adapter. A runaway `total_size` can make the
/// parser wait forever for a packet that never completes; the bound
/// turns that into a recoverable corruption event.
const MAX_ADAPTER_BYTES: usize = 16 * 1024 * 1024;

/// Prologue slot preceding the DHAV stream in the adapter.
const PROLOGUE_SLOT: usize = Prologue::SIZE;

/// Recoverable stream problems.
///
/// Reported as [`StreamEvent::Warning`] so callers can log or count
/// them; none of these end the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DemuxWarning {
    /// No `DHAV` magic in the buffered bytes; the buffer was dropped.
    #[error("DHAV packet doesn't start with the correct bytes ({buffered} bytes dropped)")]
    Prefix {
        /// Bytes discarded with the buffer
        buffered: usize,
    },

    /// A structurally invalid packet; the buffer was dropped.
    #[error("DHAV packet is corrupted: {0}")]
    Corrupted(String),

    /// A video packet with an unrecognized codec code was skipped.
    /// Code 0 means the packet carried no video-info record at all.
    #[error("unknown video format: {code}")]
    UnknownVideoCodec {
        /// Raw codec code from the 0x81 record
        code: u8,
    },

    /// An audio packet with an unrecognized format or rate was skipped.
    #[error("unknown audio format {format} / rate {rate}")]
    UnknownAudio {
        /// Raw format code from the 0x83 record
        format: u8,
        /// Raw rate code from the 0x83 record
        rate: u8,
    },

    /// The adapter exceeded its byte budget and was dropped.
    #[error("demuxer buffer overflow at {0} bytes")]
    Overflow(usize),
}

/// What a media frame contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Video access unit in byte-stream alignment.
    Video(VideoCodec),
    /// Audio frame.
    Audio(AudioCodec, AudioRate),
}

/// One demultiplexed frame, ready for a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    /// Frame classification and codec.
    pub kind: MediaKind,
    /// Codec payload (no DHAV framing).
    pub payload: Bytes,
    /// Presentation timestamp relative to the session start.
    pub pts: Duration,
}

/// Events produced by the demultiplexer, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A video stream appeared or changed codec. Sent before the first
    /// affected frame.
    VideoStream {
        /// Codec of the frames that follow
        codec: VideoCodec,
    },

    /// An audio stream appeared or changed format/rate. Sent before the
    /// first affected frame; the first occurrence asks the collaborator
    /// to create its audio sink.
    AudioStream {
        /// Codec of the frames that follow
        codec: AudioCodec,
        /// Sample rate of the frames that follow
        rate: AudioRate,
    },

    /// Start of the presentation timeline, emitted exactly once before
    /// the first frame. Consumers should open a `[0, ∞)` segment.
    SegmentStart,

    /// A demultiplexed media frame.
    Frame(MediaFrame),

    /// A recoverable stream problem.
    Warning(DemuxWarning),
}

/// Resynchronizing DHAV parser.
///
/// Push outer packets in with [`Demuxer::push_packet`], drain events
/// with [`Demuxer::poll_event`]. The demuxer never blocks: it either
/// consumes the bytes it has or waits for more.
#[derive(Debug)]
pub struct Demuxer<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    adapter: BytesMut,
    /// Inside a packet whose tail has not arrived yet. Continuation
    /// chunks are pushed body-only while this is set.
    waiting: bool,
    video_codec: Option<VideoCodec>,
    audio_params: Option<(AudioCodec, AudioRate)>,
    pts: PtsTracker<I>,
    events: VecDeque<StreamEvent>,
}

impl<I> Demuxer<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an empty demultiplexer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapter: BytesMut::new(),
            waiting: false,
            video_codec: None,
            audio_params: None,
            pts: PtsTracker::new(),
            events: VecDeque::new(),
        }
    }

    /// Next pending event, if any.
    pub fn poll_event(&mut self) -> Option<StreamEvent> {
        self.events.pop_front()
    }

    /// Number of buffered bytes awaiting a complete packet.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.adapter.len()
    }

    /// Feed one outer packet. Non-`0xbc` packets are ignored.
    ///
    /// `now` is the pipeline clock reading used to anchor presentation
    /// timestamps.
    pub fn push_packet(&mut self, packet: &Packet, now: I) {
        if packet.prologue.command() != Some(Command::DhavStream) {
            return;
        }

        if packet.body.is_empty() {
            return;
        }

        if self.waiting {
            // Continuation of the packet in progress: body only.
            self.adapter.extend_from_slice(&packet.body);
        } else {
            if packet.body.len() < dhav::MIN_PACKET_SIZE as usize {
                debug!(body = packet.body.len(), "carrier too short for a DHAV packet, discarding");
                return;
            }

            // A fresh carrier must begin a DHAV packet we care about.
            let header = match FixedHeader::from_bytes(&packet.body) {
                Ok(header) => header,
                Err(err) => {
                    debug!(error = %err, "carrier doesn't begin with a DHAV packet, discarding");
                    return;
                },
            };

            match header.kind() {
                PacketKind::Video | PacketKind::Audio => {
                    self.adapter.extend_from_slice(&packet.prologue.to_bytes());
                    self.adapter.extend_from_slice(&packet.body);
                    self.waiting = true;
                },
                PacketKind::Other(packet_type) => {
                    debug!(packet_type, "discarding DHAV packet that is not audio or video");
                    return;
                },
            }
        }

        if self.adapter.len() > MAX_ADAPTER_BYTES {
            warn!(buffered = self.adapter.len(), "demuxer buffer overflow, dropping");
            self.events.push_back(StreamEvent::Warning(DemuxWarning::Overflow(
                self.adapter.len(),
            )));
            self.reset_adapter();
            return;
        }

        self.flush(now);
    }

    /// Recover as many complete packets as the adapter holds.
    fn flush(&mut self, now: I) {
        while self.adapter.len() >= PROLOGUE_SLOT + dhav::MIN_PACKET_SIZE as usize {
            // Resync: the packet should start right after the prologue
            // slot, but scan forward in case bytes were lost.
            let Some(skipped) = find_magic(&self.adapter[PROLOGUE_SLOT..]) else {
                self.events.push_back(StreamEvent::Warning(DemuxWarning::Prefix {
                    buffered: self.adapter.len(),
                }));
                self.reset_adapter();
                return;
            };

            if skipped > 0 {
                debug!(skipped, "DHAV packet didn't start at the expected offset");
                self.adapter.advance(skipped);
                if self.adapter.len() < PROLOGUE_SLOT + dhav::MIN_PACKET_SIZE as usize {
                    return;
                }
            }

            let header = match FixedHeader::from_bytes(&self.adapter[PROLOGUE_SLOT..]) {
                Ok(header) => *header,
                Err(err) => {
                    self.events.push_back(StreamEvent::Warning(DemuxWarning::Corrupted(
                        err.to_string(),
                    )));
                    self.reset_adapter();
                    return;
                },
            };

            let need = PROLOGUE_SLOT + header.total_size() as usize;

            if let PacketKind::Other(packet_type) = header.kind() {
                if self.adapter.len() < need {
                    self.waiting = true;
                    return;
                }
                debug!(packet_type, "discarding interleaved DHAV packet");
                self.adapter.advance(need);
                continue;
            }

            if self.adapter.len() < need {
                self.waiting = true;
                return;
            }

            let packet_bytes = self.adapter.split_to(need).freeze();
            let dhav_packet = &packet_bytes[PROLOGUE_SLOT..];

            if let Err(err) = dhav::validate_trailer(dhav_packet) {
                self.events
                    .push_back(StreamEvent::Warning(DemuxWarning::Corrupted(err.to_string())));
                self.reset_adapter();
                return;
            }

            let extension = ExtensionHeader::parse(
                &dhav_packet[dhav::FIXED_HEADER_SIZE
                    ..dhav::FIXED_HEADER_SIZE + header.head_size() as usize],
            );

            let Some(kind) = self.classify(&header, &extension) else {
                // Warned already; drop this packet and keep the stream.
                self.waiting = false;
                continue;
            };

            let update = self.pts.timestamp(header.epoch(), header.ts(), now);
            if update.first {
                self.events.push_back(StreamEvent::SegmentStart);
            }
            if update.resync {
                warn!(
                    epoch = header.epoch(),
                    ts = header.ts(),
                    "device clock jumped, resynchronized"
                );
            }

            let payload_start =
                PROLOGUE_SLOT + dhav::FIXED_HEADER_SIZE + header.head_size() as usize;
            let payload =
                packet_bytes.slice(payload_start..payload_start + header.body_size() as usize);

            self.events.push_back(StreamEvent::Frame(MediaFrame {
                kind,
                payload,
                pts: update.pts,
            }));
            self.waiting = false;
        }
    }

    /// Decide the frame's codec from the extension header, announcing
    /// stream creation and codec changes. `None` skips the packet.
    fn classify(&mut self, header: &FixedHeader, extension: &ExtensionHeader) -> Option<MediaKind> {
        match header.kind() {
            PacketKind::Video => {
                match extension.video_codec_code() {
                    Some(code) => match VideoCodec::from_code(code) {
                        Some(codec) => {
                            if self.video_codec != Some(codec) {
                                self.video_codec = Some(codec);
                                self.events.push_back(StreamEvent::VideoStream { codec });
                            }
                            Some(MediaKind::Video(codec))
                        },
                        None => {
                            self.events.push_back(StreamEvent::Warning(
                                DemuxWarning::UnknownVideoCodec { code },
                            ));
                            None
                        },
                    },
                    // No video-info record; frames between key frames
                    // inherit the established codec.
                    None => match self.video_codec {
                        Some(codec) => Some(MediaKind::Video(codec)),
                        None => {
                            self.events.push_back(StreamEvent::Warning(
                                DemuxWarning::UnknownVideoCodec { code: 0 },
                            ));
                            None
                        },
                    },
                }
            },
            PacketKind::Audio => {
                match extension.audio_info() {
                    Some((format, rate)) => {
                        let codec = AudioCodec::from_code(format);
                        let parsed_rate = AudioRate::from_code(rate);
                        match (codec, parsed_rate) {
                            (Some(codec), Some(rate)) => {
                                if self.audio_params != Some((codec, rate)) {
                                    self.audio_params = Some((codec, rate));
                                    self.events
                                        .push_back(StreamEvent::AudioStream { codec, rate });
                                }
                                Some(MediaKind::Audio(codec, rate))
                            },
                            _ => {
                                self.events.push_back(StreamEvent::Warning(
                                    DemuxWarning::UnknownAudio { format, rate },
                                ));
                                None
                            },
                        }
                    },
                    None => match self.audio_params {
                        Some((codec, rate)) => Some(MediaKind::Audio(codec, rate)),
                        None => {
                            self.events.push_back(StreamEvent::Warning(
                                DemuxWarning::UnknownAudio { format: 0, rate: 0 },
                            ));
                            None
                        },
                    },
                }
            },
            PacketKind::Other(_) => None,
        }
    }

    /// Drop everything buffered and rearm for the next carrier.
    fn reset_adapter(&mut self) {
        self.adapter.clear();
        self.waiting = false;
    }
}

impl<I> Default for Demuxer<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}

fn find_magic(haystack: &[u8]) -> Option<usize> {
    haystack.windows(dhav::MAGIC.len()).position(|window| window == dhav::MAGIC)
}
