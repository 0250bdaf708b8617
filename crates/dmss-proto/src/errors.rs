//! Error types for wire-format parsing.
//!
//! Everything here is a structural problem with bytes received from the
//! device. Whether an error is fatal to the session or merely drops a
//! packet is decided by the caller; the demultiplexer in `dmss-client`
//! treats DHAV framing errors as resynchronization points, while the
//! handshake treats any of these as fatal.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Structural errors in DMSS or DHAV wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than the structure requires.
    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes required to parse the structure
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Outer packet body length exceeds the sanity limit.
    #[error("body of {size} bytes exceeds limit of {max}")]
    BodyTooLarge {
        /// Claimed body size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// DHAV packet does not begin with the `DHAV` magic.
    #[error("DHAV packet does not start with the correct bytes")]
    BadMagic,

    /// DHAV total size is below the fixed header + trailer minimum.
    #[error("DHAV packet size {0} below minimum of 32")]
    PacketTooSmall(u32),

    /// DHAV extension header would overrun the packet.
    #[error("extension of {head_size} bytes overruns DHAV packet of {total_size} bytes")]
    ExtensionOverrun {
        /// Claimed extension size
        head_size: u8,
        /// Total packet size from the fixed header
        total_size: u32,
    },

    /// DHAV packet does not end with the `dhav` trailer magic.
    #[error("DHAV packet doesn't end with dhav suffix")]
    BadTrailer,

    /// Trailer size field disagrees with the fixed header.
    #[error("trailer size {trailer} doesn't match header packet size {header}")]
    TrailerSizeMismatch {
        /// Size from the fixed header
        header: u32,
        /// Size from the trailer
        trailer: u32,
    },

    /// A required `Key:` line is absent from a control response.
    #[error("control response is missing {0:?}")]
    MissingKey(&'static str),

    /// The device answered a control request with a non-OK fault code.
    #[error("device fault: FaultCode:{0}")]
    Fault(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable() {
        let err = ProtocolError::TrailerSizeMismatch { header: 100, trailer: 96 };
        assert_eq!(err.to_string(), "trailer size 96 doesn't match header packet size 100");

        let err = ProtocolError::Fault("32".to_string());
        assert_eq!(err.to_string(), "device fault: FaultCode:32");
    }
}
