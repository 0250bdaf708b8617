//! The DHAV frame wrapper.
//!
//! DHAV ("Dahua Hybrid Audio Video") is the per-frame wrapper the device
//! uses on the wire. Each packet is:
//!
//! ```text
//! [fixed header: 24 bytes]  'DHAV', type, total size, epoch, ts, ext size
//! [extension:  0-255 bytes] sequence of 4-byte big-endian tagged records
//! [body:       variable]    codec payload (H.264/H.265 NALs, audio frames)
//! [trailer:     8 bytes]    'dhav' + total size again (u32-LE)
//! ```
//!
//! All fixed-header integers are little-endian; extension records are
//! big-endian words with the tag in the most significant byte. The
//! duplicated size in the trailer is what makes stream resynchronization
//! after corruption detectable.
//!
//! The device timestamps every packet with a 16-bit seconds counter
//! ("epoch" — not Unix time) and a 16-bit millisecond counter that wraps
//! roughly every 65 seconds; turning those into a usable presentation
//! clock is the demultiplexer's job, not this crate's.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Leading magic of every DHAV packet.
pub const MAGIC: [u8; 4] = *b"DHAV";

/// Magic of the 8-byte trailer.
pub const TRAILER_MAGIC: [u8; 4] = *b"dhav";

/// Size of the fixed header.
pub const FIXED_HEADER_SIZE: usize = 24;

/// Size of the trailer.
pub const TRAILER_SIZE: usize = 8;

/// Smallest legal packet: empty extension, empty body.
pub const MIN_PACKET_SIZE: u32 = (FIXED_HEADER_SIZE + TRAILER_SIZE) as u32;

/// Packet type byte for audio frames.
pub const PACKET_TYPE_AUDIO: u8 = 0xf0;

/// Packet type byte for video key frames.
pub const PACKET_TYPE_VIDEO_I: u8 = 0xfc;

/// Packet type byte for video predicted frames.
pub const PACKET_TYPE_VIDEO_P: u8 = 0xfd;

/// Extension record tag carrying video info (codec in bits 8..16).
pub const VIDEO_INFO_TAG: u8 = 0x81;

/// Extension record tag carrying audio info (format in bits 8..16, rate
/// code in bits 0..8).
pub const AUDIO_INFO_TAG: u8 = 0x83;

/// Maximum number of extension records a packet can carry.
pub const MAX_EXTENSION_RECORDS: usize = 32;

/// Coarse classification of a DHAV packet by its type byte.
///
/// Devices interleave other packet types (still frames, metadata) into
/// the stream; those are skipped whole by the demultiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Video frame (I or P).
    Video,
    /// Audio frame.
    Audio,
    /// Anything else; carries the raw type byte.
    Other(u8),
}

/// Fixed 24-byte DHAV packet header (little-endian fields).
///
/// Fields are stored as raw byte arrays to avoid alignment issues; the
/// `zerocopy` traits let untrusted stream bytes be cast to a reference
/// without copying, since every 24-byte pattern is a valid
/// `FixedHeader`.
///
/// # Invariants
///
/// Enforced by [`FixedHeader::from_bytes`]:
///
/// - the buffer starts with the `DHAV` magic
/// - `total_size() >= 32` (header + trailer always fit)
/// - `head_size() + 32 <= total_size()` (the extension never overruns)
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FixedHeader {
    magic: [u8; 4],
    packet_type: u8,
    _reserved: [u8; 7],
    total_size: [u8; 4],
    epoch: [u8; 2],
    _reserved2: [u8; 2],
    ts: [u8; 2],
    head_size: u8,
    _reserved3: u8,
}

impl FixedHeader {
    /// Size of the serialized fixed header (24 bytes).
    pub const SIZE: usize = FIXED_HEADER_SIZE;

    /// Parse the fixed header from the front of `bytes` (zero-copy).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::TooShort`] if fewer than 24 bytes are available
    /// - [`ProtocolError::BadMagic`] if the `DHAV` magic is absent
    /// - [`ProtocolError::PacketTooSmall`] if `total_size < 32`
    /// - [`ProtocolError::ExtensionOverrun`] if the extension would not
    ///   fit inside the packet
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::TooShort { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        let magic = header.magic;
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic);
        }

        let total_size = header.total_size();
        if total_size < MIN_PACKET_SIZE {
            return Err(ProtocolError::PacketTooSmall(total_size));
        }

        if u32::from(header.head_size) + MIN_PACKET_SIZE > total_size {
            return Err(ProtocolError::ExtensionOverrun {
                head_size: header.head_size,
                total_size,
            });
        }

        Ok(header)
    }

    /// Serialize to the 24 wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Raw packet type byte.
    #[must_use]
    pub fn packet_type(&self) -> u8 {
        self.packet_type
    }

    /// Total packet size: header + extension + body + trailer.
    #[must_use]
    pub fn total_size(&self) -> u32 {
        u32::from_le_bytes(self.total_size)
    }

    /// Device seconds counter (16-bit, wraps ~18 h).
    #[must_use]
    pub fn epoch(&self) -> u16 {
        u16::from_le_bytes(self.epoch)
    }

    /// Device millisecond counter (16-bit, wraps ~65 s).
    #[must_use]
    pub fn ts(&self) -> u16 {
        u16::from_le_bytes(self.ts)
    }

    /// Extension header size in bytes.
    #[must_use]
    pub fn head_size(&self) -> u8 {
        self.head_size
    }

    /// Classify the packet by its type byte.
    #[must_use]
    pub fn kind(&self) -> PacketKind {
        match self.packet_type {
            PACKET_TYPE_VIDEO_I | PACKET_TYPE_VIDEO_P => PacketKind::Video,
            PACKET_TYPE_AUDIO => PacketKind::Audio,
            other => PacketKind::Other(other),
        }
    }

    /// Codec payload size: total minus header, extension and trailer.
    #[must_use]
    pub fn body_size(&self) -> u32 {
        // INVARIANT: from_bytes() guarantees head_size + 32 <= total_size,
        // so this cannot underflow.
        self.total_size() - MIN_PACKET_SIZE - u32::from(self.head_size)
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FixedHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedHeader")
            .field("packet_type", &format!("{:#04x}", self.packet_type()))
            .field("total_size", &self.total_size())
            .field("epoch", &self.epoch())
            .field("ts", &self.ts())
            .field("head_size", &self.head_size())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FixedHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FixedHeader {}

/// Validate the 8-byte trailer of a complete DHAV packet.
///
/// `packet` must be the whole packet (`total_size` bytes as claimed by
/// its fixed header).
///
/// # Errors
///
/// - [`ProtocolError::TooShort`] if the slice cannot hold a trailer
/// - [`ProtocolError::BadTrailer`] if the `dhav` magic is absent
/// - [`ProtocolError::TrailerSizeMismatch`] if the duplicated size field
///   disagrees with the slice length
pub fn validate_trailer(packet: &[u8]) -> Result<()> {
    if packet.len() < TRAILER_SIZE {
        return Err(ProtocolError::TooShort { expected: TRAILER_SIZE, actual: packet.len() });
    }

    let trailer = &packet[packet.len() - TRAILER_SIZE..];
    if trailer[0..4] != TRAILER_MAGIC {
        return Err(ProtocolError::BadTrailer);
    }

    let trailer_size = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
    if trailer_size as usize != packet.len() {
        return Err(ProtocolError::TrailerSizeMismatch {
            header: packet.len() as u32,
            trailer: trailer_size,
        });
    }

    Ok(())
}

/// Parsed extension header: up to 32 big-endian tagged records.
///
/// Each record is a 32-bit word whose most significant byte is the tag
/// and whose low 24 bits are the value. A zero tag terminates the
/// sequence. Tags 0x88 and 0x82 are reserved by the devices for wider
/// records but are unused in live streams; every record is treated as a
/// 4-byte word here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionHeader {
    records: [u32; MAX_EXTENSION_RECORDS],
    len: usize,
}

impl ExtensionHeader {
    /// Parse the extension bytes of a packet.
    ///
    /// A trailing fragment shorter than 4 bytes is ignored, matching
    /// device behavior when firmwares pad the extension.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Self {
        let mut records = [0u32; MAX_EXTENSION_RECORDS];
        let mut len = 0;

        for chunk in bytes.chunks_exact(4).take(MAX_EXTENSION_RECORDS) {
            records[len] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            len += 1;
        }

        Self { records, len }
    }

    /// Low 24 bits of the first record with the given tag. `None` if the
    /// sequence terminates (zero tag) or runs out first.
    #[must_use]
    pub fn find(&self, tag: u8) -> Option<u32> {
        for record in &self.records[..self.len] {
            let record_tag = (record >> 24) as u8;
            if record_tag == tag {
                return Some(record & 0x00ff_ffff);
            }
            if record_tag == 0 {
                break;
            }
        }
        None
    }

    /// Raw video codec code from the 0x81 record.
    #[must_use]
    pub fn video_codec_code(&self) -> Option<u8> {
        self.find(VIDEO_INFO_TAG).map(|value| ((value >> 8) & 0xff) as u8)
    }

    /// Raw `(format, rate)` codes from the 0x83 record.
    #[must_use]
    pub fn audio_info(&self) -> Option<(u8, u8)> {
        self.find(AUDIO_INFO_TAG)
            .map(|value| (((value >> 8) & 0xff) as u8, (value & 0xff) as u8))
    }
}

/// Video codec identifiers carried in the 0x81 extension record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264 / AVC byte-stream.
    H264,
    /// H.265 / HEVC byte-stream.
    H265,
}

impl VideoCodec {
    /// Decode the codec code from the video-info record.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::H264),
            2 => Some(Self::H265),
            _ => None,
        }
    }
}

/// Audio codec identifiers carried in the 0x83 extension record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    /// G.711 A-law.
    Alaw,
    /// G.711 mu-law.
    Mulaw,
    /// G.726 ADPCM.
    G726,
    /// AAC in ADTS framing.
    Aac,
}

impl AudioCodec {
    /// Decode the format code from the audio-info record.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x0e => Some(Self::Alaw),
            0x0a => Some(Self::Mulaw),
            0x0d => Some(Self::G726),
            0x1a => Some(Self::Aac),
            _ => None,
        }
    }
}

/// Audio sample rates carried in the 0x83 extension record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioRate {
    /// 8 kHz.
    Hz8000,
    /// 16 kHz.
    Hz16000,
    /// 64 kHz.
    Hz64000,
}

impl AudioRate {
    /// Decode the rate code from the audio-info record.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x02 => Some(Self::Hz8000),
            0x04 => Some(Self::Hz16000),
            0x07 => Some(Self::Hz64000),
            _ => None,
        }
    }

    /// The rate in Hertz.
    #[must_use]
    pub fn hertz(self) -> u32 {
        match self {
            Self::Hz8000 => 8000,
            Self::Hz16000 => 16000,
            Self::Hz64000 => 64000,
        }
    }
}

/// Description of a DHAV packet to encode.
///
/// Encoding exists for the device simulators used in tests and tooling;
/// live clients only ever parse.
#[derive(Debug, Clone, Copy)]
pub struct PacketSpec<'a> {
    /// Packet type byte.
    pub packet_type: u8,
    /// Device seconds counter.
    pub epoch: u16,
    /// Device millisecond counter.
    pub ts: u16,
    /// Extension header bytes (must be at most 255 bytes).
    pub extension: &'a [u8],
    /// Codec payload.
    pub body: &'a [u8],
}

/// Encode a complete DHAV packet: fixed header, extension, body, trailer.
#[must_use]
pub fn encode_packet(spec: &PacketSpec<'_>) -> Vec<u8> {
    debug_assert!(spec.extension.len() <= u8::MAX as usize);

    let total_size = MIN_PACKET_SIZE as usize + spec.extension.len() + spec.body.len();
    let mut packet = Vec::with_capacity(total_size);

    packet.extend_from_slice(&MAGIC);
    packet.push(spec.packet_type);
    packet.extend_from_slice(&[0u8; 7]);
    packet.extend_from_slice(&(total_size as u32).to_le_bytes());
    packet.extend_from_slice(&spec.epoch.to_le_bytes());
    packet.extend_from_slice(&[0u8; 2]);
    packet.extend_from_slice(&spec.ts.to_le_bytes());
    packet.push(spec.extension.len() as u8);
    packet.push(0);

    debug_assert_eq!(packet.len(), FIXED_HEADER_SIZE);

    packet.extend_from_slice(spec.extension);
    packet.extend_from_slice(spec.body);
    packet.extend_from_slice(&TRAILER_MAGIC);
    packet.extend_from_slice(&(total_size as u32).to_le_bytes());

    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: u8, value: u32) -> [u8; 4] {
        ((u32::from(tag) << 24) | (value & 0x00ff_ffff)).to_be_bytes()
    }

    #[test]
    fn fixed_header_size() {
        assert_eq!(std::mem::size_of::<FixedHeader>(), FixedHeader::SIZE);
        assert_eq!(FixedHeader::SIZE, 24);
    }

    #[test]
    fn parse_minimal_packet() {
        let packet = encode_packet(&PacketSpec {
            packet_type: PACKET_TYPE_VIDEO_I,
            epoch: 0,
            ts: 0,
            extension: &[],
            body: &[],
        });
        assert_eq!(packet.len(), 32);

        let header = FixedHeader::from_bytes(&packet).unwrap();
        assert_eq!(header.total_size(), MIN_PACKET_SIZE);
        assert_eq!(header.head_size(), 0);
        assert_eq!(header.body_size(), 0);
        assert_eq!(header.kind(), PacketKind::Video);
        validate_trailer(&packet).unwrap();
    }

    #[test]
    fn parse_header_fields() {
        let ext = record(VIDEO_INFO_TAG, 0x0100);
        let packet = encode_packet(&PacketSpec {
            packet_type: PACKET_TYPE_VIDEO_P,
            epoch: 1000,
            ts: 500,
            extension: &ext,
            body: &[0xaa; 60],
        });

        let header = FixedHeader::from_bytes(&packet).unwrap();
        assert_eq!(header.packet_type(), PACKET_TYPE_VIDEO_P);
        assert_eq!(header.total_size(), 32 + 4 + 60);
        assert_eq!(header.epoch(), 1000);
        assert_eq!(header.ts(), 500);
        assert_eq!(header.head_size(), 4);
        assert_eq!(header.body_size(), 60);
    }

    #[test]
    fn header_round_trip() {
        let packet = encode_packet(&PacketSpec {
            packet_type: PACKET_TYPE_AUDIO,
            epoch: 4242,
            ts: 65500,
            extension: &[],
            body: &[7; 3],
        });

        let header = *FixedHeader::from_bytes(&packet).unwrap();
        let bytes = header.to_bytes();
        let parsed = FixedHeader::from_bytes(&bytes).unwrap();
        assert_eq!(&header, parsed);
    }

    #[test]
    fn reject_bad_magic() {
        let mut packet = encode_packet(&PacketSpec {
            packet_type: PACKET_TYPE_AUDIO,
            epoch: 0,
            ts: 0,
            extension: &[],
            body: &[],
        });
        packet[0] = b'X';
        assert_eq!(FixedHeader::from_bytes(&packet), Err(ProtocolError::BadMagic));
    }

    #[test]
    fn reject_undersized_total() {
        let mut packet = encode_packet(&PacketSpec {
            packet_type: PACKET_TYPE_AUDIO,
            epoch: 0,
            ts: 0,
            extension: &[],
            body: &[],
        });
        packet[12..16].copy_from_slice(&16u32.to_le_bytes());
        assert_eq!(FixedHeader::from_bytes(&packet), Err(ProtocolError::PacketTooSmall(16)));
    }

    #[test]
    fn reject_extension_overrun() {
        let mut packet = encode_packet(&PacketSpec {
            packet_type: PACKET_TYPE_AUDIO,
            epoch: 0,
            ts: 0,
            extension: &[0u8; 4],
            body: &[],
        });
        packet[22] = 200;
        assert!(matches!(
            FixedHeader::from_bytes(&packet),
            Err(ProtocolError::ExtensionOverrun { head_size: 200, .. })
        ));
    }

    #[test]
    fn reject_trailer_mismatch() {
        let mut packet = encode_packet(&PacketSpec {
            packet_type: PACKET_TYPE_VIDEO_I,
            epoch: 0,
            ts: 0,
            extension: &[],
            body: &[1, 2, 3],
        });

        let len = packet.len();
        packet[len - 4..].copy_from_slice(&999u32.to_le_bytes());
        assert_eq!(
            validate_trailer(&packet),
            Err(ProtocolError::TrailerSizeMismatch { header: 35, trailer: 999 })
        );

        packet[len - 8] = b'X';
        assert_eq!(validate_trailer(&packet), Err(ProtocolError::BadTrailer));
    }

    #[test]
    fn extension_lookup() {
        let mut ext = Vec::new();
        ext.extend_from_slice(&record(0x82, 0x123456));
        ext.extend_from_slice(&record(VIDEO_INFO_TAG, 0x0200));
        ext.extend_from_slice(&record(AUDIO_INFO_TAG, 0x0e02));

        let parsed = ExtensionHeader::parse(&ext);
        assert_eq!(parsed.find(VIDEO_INFO_TAG), Some(0x0200));
        assert_eq!(parsed.video_codec_code(), Some(2));
        assert_eq!(parsed.audio_info(), Some((0x0e, 0x02)));
        assert_eq!(parsed.find(0x99), None);
    }

    #[test]
    fn zero_tag_terminates_lookup() {
        let mut ext = Vec::new();
        ext.extend_from_slice(&record(0, 0));
        ext.extend_from_slice(&record(VIDEO_INFO_TAG, 0x0100));

        let parsed = ExtensionHeader::parse(&ext);
        assert_eq!(parsed.find(VIDEO_INFO_TAG), None);
    }

    #[test]
    fn empty_extension_has_no_records() {
        let parsed = ExtensionHeader::parse(&[]);
        assert_eq!(parsed.find(VIDEO_INFO_TAG), None);
        assert_eq!(parsed.video_codec_code(), None);
        assert_eq!(parsed.audio_info(), None);
    }

    #[test]
    fn trailing_fragment_is_ignored() {
        let mut ext = Vec::new();
        ext.extend_from_slice(&record(VIDEO_INFO_TAG, 0x0100));
        ext.extend_from_slice(&[0x83, 0x00]); // truncated record

        let parsed = ExtensionHeader::parse(&ext);
        assert_eq!(parsed.video_codec_code(), Some(1));
        assert_eq!(parsed.audio_info(), None);
    }

    #[test]
    fn codec_codes() {
        assert_eq!(VideoCodec::from_code(1), Some(VideoCodec::H264));
        assert_eq!(VideoCodec::from_code(2), Some(VideoCodec::H265));
        assert_eq!(VideoCodec::from_code(3), None);

        assert_eq!(AudioCodec::from_code(0x0e), Some(AudioCodec::Alaw));
        assert_eq!(AudioCodec::from_code(0x0a), Some(AudioCodec::Mulaw));
        assert_eq!(AudioCodec::from_code(0x0d), Some(AudioCodec::G726));
        assert_eq!(AudioCodec::from_code(0x1a), Some(AudioCodec::Aac));
        assert_eq!(AudioCodec::from_code(0x00), None);

        assert_eq!(AudioRate::from_code(0x02).map(AudioRate::hertz), Some(8000));
        assert_eq!(AudioRate::from_code(0x04).map(AudioRate::hertz), Some(16000));
        assert_eq!(AudioRate::from_code(0x07).map(AudioRate::hertz), Some(64000));
        assert_eq!(AudioRate::from_code(0x05), None);
    }
}
