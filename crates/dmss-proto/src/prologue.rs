//! Outer packet prologue with zero-copy parsing.
//!
//! Every DMSS message starts with a fixed 32-byte prologue. Unlike most
//! network protocols the multi-byte fields are little-endian, matching the
//! device firmware. The prologue carries the command byte, the body length
//! that follows, and, on login responses, the authentication result and
//! the assigned session id.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Command byte leading every outer packet.
///
/// The set below is what a live-view client exchanges; devices emit other
/// commands too, which callers skip by body length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Login request / response.
    Login = 0xa0,
    /// Keep-alive NOP.
    Nop = 0xa1,
    /// Device acknowledgement of a NOP.
    NopAck = 0xb1,
    /// Carrier for DHAV media payload on the stream connection.
    DhavStream = 0xbc,
    /// Legacy stream-link command (pre-text-protocol devices).
    LegacyStreamLink = 0xf1,
    /// Text-bodied control request / response (`Method:` protocol).
    Rpc = 0xf4,
    /// Legacy stream-start command (pre-text-protocol devices).
    LegacyStreamStart = 0x11,
}

impl Command {
    /// Decode a command byte. `None` if unrecognized.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0xa0 => Some(Self::Login),
            0xa1 => Some(Self::Nop),
            0xb1 => Some(Self::NopAck),
            0xbc => Some(Self::DhavStream),
            0xf1 => Some(Self::LegacyStreamLink),
            0xf4 => Some(Self::Rpc),
            0x11 => Some(Self::LegacyStreamStart),
            _ => None,
        }
    }

    /// The raw wire byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Fixed 32-byte outer packet prologue (little-endian fields).
///
/// Fields are stored as raw byte arrays to avoid alignment issues; the
/// `zerocopy` traits let untrusted network bytes be cast to a reference
/// without copying, since every 32-byte pattern is a valid `Prologue`.
///
/// # Invariants
///
/// - `body_size()` equals the number of body bytes that follow the
///   prologue on the wire. The framing layer enforces this by reading
///   exactly that many bytes.
/// - `body_size()` never exceeds [`Prologue::MAX_BODY_SIZE`]; larger
///   claims are rejected during parsing before any allocation happens.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Prologue {
    command: u8,
    _reserved: [u8; 3],
    body_size: [u8; 4],
    auth_result: u8,
    _reserved2: [u8; 7],
    session_id: [u8; 4],
    _tail: [u8; 12],
}

impl Prologue {
    /// Size of the serialized prologue (32 bytes).
    pub const SIZE: usize = 32;

    /// Maximum accepted body size (16 MiB).
    ///
    /// A live camera never sends bodies anywhere near this; a larger
    /// claim means a desynchronized or hostile peer.
    pub const MAX_BODY_SIZE: u32 = 16 * 1024 * 1024;

    /// Create an all-zero prologue with the given command byte.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command: command.to_u8(),
            _reserved: [0; 3],
            body_size: [0; 4],
            auth_result: 0,
            _reserved2: [0; 7],
            session_id: [0; 4],
            _tail: [0; 12],
        }
    }

    /// Parse a prologue from network bytes (zero-copy).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::TooShort`] if fewer than 32 bytes are available
    /// - [`ProtocolError::BodyTooLarge`] if the claimed body length
    ///   exceeds [`Prologue::MAX_BODY_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let prologue = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::TooShort { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        let body_size = u32::from_le_bytes(prologue.body_size);
        if body_size > Self::MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge {
                size: body_size as usize,
                max: Self::MAX_BODY_SIZE as usize,
            });
        }

        Ok(prologue)
    }

    /// Serialize to the 32 wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Raw command byte.
    #[must_use]
    pub fn command_byte(&self) -> u8 {
        self.command
    }

    /// Command byte as enum. `None` if unrecognized.
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        Command::from_u8(self.command)
    }

    /// Number of body bytes following the prologue.
    #[must_use]
    pub fn body_size(&self) -> u32 {
        u32::from_le_bytes(self.body_size)
    }

    /// Authentication result on a login response; non-zero means the
    /// device rejected the credentials.
    #[must_use]
    pub fn auth_result(&self) -> u8 {
        self.auth_result
    }

    /// Session id assigned by the device on the login response and echoed
    /// in later attachments.
    #[must_use]
    pub fn session_id(&self) -> u32 {
        u32::from_le_bytes(self.session_id)
    }

    /// Set the body length field.
    pub fn set_body_size(&mut self, size: u32) {
        self.body_size = size.to_le_bytes();
    }

    /// Set the session id field.
    pub fn set_session_id(&mut self, session_id: u32) {
        self.session_id = session_id.to_le_bytes();
    }

    /// Set the authentication result byte.
    pub fn set_auth_result(&mut self, result: u8) {
        self.auth_result = result;
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for Prologue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prologue")
            .field("command", &format!("{:#04x}", self.command))
            .field("body_size", &self.body_size())
            .field("auth_result", &self.auth_result())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for Prologue {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Prologue {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prologue_size() {
        assert_eq!(std::mem::size_of::<Prologue>(), Prologue::SIZE);
        assert_eq!(Prologue::SIZE, 32);
    }

    #[test]
    fn field_offsets_match_wire_layout() {
        let mut prologue = Prologue::new(Command::Login);
        prologue.set_body_size(0x0403_0201);
        prologue.set_auth_result(0x7f);
        prologue.set_session_id(0xaabb_ccdd);

        let bytes = prologue.to_bytes();
        assert_eq!(bytes[0], 0xa0);
        assert_eq!(&bytes[4..8], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(bytes[8], 0x7f);
        assert_eq!(&bytes[16..20], &[0xdd, 0xcc, 0xbb, 0xaa]);
    }

    #[test]
    fn round_trip() {
        let mut prologue = Prologue::new(Command::Rpc);
        prologue.set_body_size(77);
        prologue.set_session_id(1);

        let bytes = prologue.to_bytes();
        let parsed = Prologue::from_bytes(&bytes).unwrap();
        assert_eq!(&prologue, parsed);
        assert_eq!(parsed.command(), Some(Command::Rpc));
        assert_eq!(parsed.body_size(), 77);
        assert_eq!(parsed.session_id(), 1);
    }

    #[test]
    fn reject_short_buffer() {
        let result = Prologue::from_bytes(&[0u8; 16]);
        assert_eq!(result, Err(ProtocolError::TooShort { expected: 32, actual: 16 }));
    }

    #[test]
    fn reject_oversized_body() {
        let mut bytes = [0u8; 32];
        bytes[4..8].copy_from_slice(&(Prologue::MAX_BODY_SIZE + 1).to_le_bytes());

        let result = Prologue::from_bytes(&bytes);
        assert!(matches!(result, Err(ProtocolError::BodyTooLarge { .. })));
    }

    #[test]
    fn unknown_command_byte() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x42;
        let prologue = Prologue::from_bytes(&bytes).unwrap();
        assert_eq!(prologue.command(), None);
        assert_eq!(prologue.command_byte(), 0x42);
    }
}
