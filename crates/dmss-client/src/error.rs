//! Error types for the session layer.
//!
//! Strongly-typed errors for the connection lifecycle: I/O failures,
//! authentication rejection, protocol violations, and external
//! cancellation. All of these are fatal to the session; recoverable
//! stream hiccups are [`crate::DemuxWarning`]s instead and never appear
//! here.
//!
//! Read timeouts surface as [`SessionError::Io`] with
//! [`std::io::ErrorKind::TimedOut`], matching how the socket layer
//! reports them.

use std::io;

use thiserror::Error;

use crate::handshake::HandshakeState;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that end a session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Socket-level failure (connect, read, write, or per-read timeout).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The device rejected the credentials at login.
    #[error("authentication failed, verify your username and password")]
    AuthFailed,

    /// Received a command byte the current handshake state cannot accept.
    #[error("unexpected command {command:#04x} in state {state:?}")]
    UnexpectedCommand {
        /// Handshake state when the packet arrived
        state: HandshakeState,
        /// Command byte of the offending packet
        command: u8,
    },

    /// An operation was attempted in the wrong handshake state.
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred
        state: HandshakeState,
        /// Operation that was attempted
        operation: String,
    },

    /// Malformed or refused control exchange (bad text response, missing
    /// key, non-OK fault code).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer closed the connection cleanly.
    #[error("connection closed by device")]
    ConnectionClosed,

    /// The session's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The session cannot start with the given configuration.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

impl SessionError {
    /// True when the error is a per-read timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == io::ErrorKind::TimedOut)
    }
}

/// Convert wire-format errors to `SessionError`.
///
/// At the session layer a structural protocol error is fatal; the
/// demultiplexer handles the recoverable ones itself before they reach
/// this boundary.
impl From<dmss_proto::ProtocolError> for SessionError {
    fn from(err: dmss_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_detection() {
        let err = SessionError::Io(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        assert!(err.is_timeout());

        let err = SessionError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(!err.is_timeout());

        assert!(!SessionError::AuthFailed.is_timeout());
    }

    #[test]
    fn protocol_errors_convert() {
        let err: SessionError = dmss_proto::ProtocolError::MissingKey("FaultCode:").into();
        assert!(matches!(err, SessionError::Protocol(_)));
    }
}
