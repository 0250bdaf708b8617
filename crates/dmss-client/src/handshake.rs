//! Start-up handshake state machine.
//!
//! Brings a session from two bare TCP connections to a running live
//! stream. Uses the action pattern: methods consume received packets and
//! return actions for the driver to execute. This keeps the state machine
//! pure (no I/O) and makes every transition testable with canned packets.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ start  ┌────────────────┐ login ok ┌─────────────┐ 0xb1 ┌──────────────────┐
//! │ Idle │───────>│ Authenticating │─────────>│ NopFlushing │─────>│ StreamConnecting │
//! └──────┘        └────────────────┘          └─────────────┘      └──────────────────┘
//!                        │ result byte != 0                                 │ stream
//!                        ↓                                                  ↓ connected
//!                   AuthFailed                                    ┌───────────────┐
//!                                                                 │ AddObjectSent │
//! ┌───────────┐  0xf4  ┌───────────┐  0xf4 ok  ┌───────────────────┐ 0xf4 ok │
//! │ Streaming │<───────│ StartSent │<──────────│ AckSubChannelSent │<────────┘
//! └───────────┘        └───────────┘           └───────────────────┘
//! ```
//!
//! The login, NOP flush, AddObject and monitor-start exchanges happen on
//! the control connection; AckSubChannel happens on the stream
//! connection, which is what binds it to the session.

use dmss_proto::{command, text, Command, ProtocolError};

use crate::{
    config::SessionConfig,
    error::{Result, SessionError},
    wire::Packet,
};

/// Connection ids are at most 15 ASCII bytes; devices send longer values
/// but only honor the truncated prefix.
const CONNECTION_ID_MAX: usize = 15;

/// Actions returned by the handshake state machine.
///
/// The driver executes these in order: writes go to the named
/// connection, `ConnectStream` opens the second TCP connection (and is
/// followed by [`Handshake::stream_connected`]), `Established` means the
/// device is now pushing media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Write these bytes on the control connection.
    SendControl(Vec<u8>),

    /// Write these bytes on the stream connection.
    SendStream(Vec<u8>),

    /// Open the stream TCP connection to the same host and port.
    ConnectStream,

    /// Handshake complete; the stream connection now carries media.
    Established,
}

/// Handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Idle,
    /// Login request sent, waiting for the result packet.
    Authenticating,
    /// NOP sent, draining packets until the 0xb1 acknowledgement.
    NopFlushing,
    /// Waiting for the driver to open the stream connection.
    StreamConnecting,
    /// AddObject sent on the control connection.
    AddObjectSent,
    /// AckSubChannel sent on the stream connection.
    AckSubChannelSent,
    /// Monitor-start sent on the control connection.
    StartSent,
    /// Terminal running state.
    Streaming,
}

/// The start-up handshake as a pure state machine.
///
/// Drives login, the keep-alive flush, control-connection registration
/// (`AddObject`), stream-connection binding (`AckSubChannel`) and the
/// monitor-start request. The driver owns the sockets and pumps packets
/// in via [`Handshake::handle_control_packet`] and
/// [`Handshake::handle_stream_packet`].
#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
    user: String,
    password: String,
    channel: u32,
    subchannel: u32,
    session_id: Option<u32>,
    connection_id: Option<String>,
}

impl Handshake {
    /// Create a handshake in [`HandshakeState::Idle`] for this config.
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            state: HandshakeState::Idle,
            user: config.user.clone(),
            password: config.password.clone(),
            channel: config.channel,
            subchannel: config.subchannel,
            session_id: None,
            connection_id: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Session id assigned at login. `None` before authentication.
    #[must_use]
    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    /// Connection id from the AddObject response. `None` until then.
    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Begin the handshake by sending the login request.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidState`] if not in `Idle`
    pub fn start(&mut self) -> Result<Vec<HandshakeAction>> {
        if self.state != HandshakeState::Idle {
            return Err(self.invalid_state("start"));
        }

        self.state = HandshakeState::Authenticating;
        Ok(vec![HandshakeAction::SendControl(command::login_packet(&self.user, &self.password))])
    }

    /// Notify the machine that the stream connection is open.
    ///
    /// Triggers the AddObject registration on the control connection.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidState`] if not in `StreamConnecting`
    pub fn stream_connected(&mut self) -> Result<Vec<HandshakeAction>> {
        if self.state != HandshakeState::StreamConnecting {
            return Err(self.invalid_state("stream_connected"));
        }

        self.state = HandshakeState::AddObjectSent;
        Ok(vec![HandshakeAction::SendControl(command::rpc_packet(&command::add_object_body()))])
    }

    /// Process a packet received on the control connection.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AuthFailed`] if the login result byte is non-zero
    /// - [`SessionError::UnexpectedCommand`] on a command byte the state
    ///   cannot accept
    /// - [`SessionError::Protocol`] on a malformed or refused text body
    /// - [`SessionError::InvalidState`] if the control connection should
    ///   be quiet in the current state
    pub fn handle_control_packet(&mut self, packet: &Packet) -> Result<Vec<HandshakeAction>> {
        match self.state {
            HandshakeState::Authenticating => self.handle_login_result(packet),

            HandshakeState::NopFlushing => {
                if packet.prologue.command() == Some(Command::NopAck) {
                    self.state = HandshakeState::StreamConnecting;
                    Ok(vec![HandshakeAction::ConnectStream])
                } else {
                    // Devices push queued status packets here; drain them.
                    Ok(vec![])
                }
            },

            HandshakeState::AddObjectSent => {
                self.expect_rpc(packet)?;
                text::require_fault_code_ok(&packet.body)?;

                let connection_id = text::find_value(&packet.body, text::CONNECTION_ID_KEY)
                    .ok_or(ProtocolError::MissingKey("ConnectionID:"))?;
                let connection_id = truncate_connection_id(connection_id);

                let session_id = self.session_id.ok_or_else(|| {
                    SessionError::Protocol("AddObject answered before login".to_string())
                })?;

                let body = command::ack_subchannel_body(session_id, &connection_id);
                self.connection_id = Some(connection_id);
                self.state = HandshakeState::AckSubChannelSent;

                Ok(vec![HandshakeAction::SendStream(command::rpc_packet(&body))])
            },

            HandshakeState::StartSent => {
                self.expect_rpc(packet)?;
                text::require_fault_code_ok(&packet.body)?;

                self.state = HandshakeState::Streaming;
                Ok(vec![HandshakeAction::Established])
            },

            _ => Err(self.invalid_state("handle_control_packet")),
        }
    }

    /// Process a packet received on the stream connection.
    ///
    /// Only the AckSubChannel reply arrives here during the handshake;
    /// everything after `Established` goes to the demultiplexer instead.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnexpectedCommand`] on a command byte the state
    ///   cannot accept
    /// - [`SessionError::Protocol`] on a non-OK fault code
    /// - [`SessionError::InvalidState`] if the stream connection should
    ///   be quiet in the current state
    pub fn handle_stream_packet(&mut self, packet: &Packet) -> Result<Vec<HandshakeAction>> {
        match self.state {
            HandshakeState::AckSubChannelSent => {
                self.expect_rpc(packet)?;
                text::require_fault_code_ok(&packet.body)?;

                let connection_id = self.connection_id.as_deref().ok_or_else(|| {
                    SessionError::Protocol("AckSubChannel answered before AddObject".to_string())
                })?;

                let body =
                    command::monitor_start_body(self.channel, self.subchannel, connection_id);
                self.state = HandshakeState::StartSent;

                Ok(vec![HandshakeAction::SendControl(command::rpc_packet(&body))])
            },

            _ => Err(self.invalid_state("handle_stream_packet")),
        }
    }

    fn handle_login_result(&mut self, packet: &Packet) -> Result<Vec<HandshakeAction>> {
        // The session id is echoed even on rejection; capture before the
        // result check so diagnostics can report it.
        self.session_id = Some(packet.prologue.session_id());

        if packet.prologue.auth_result() != 0 {
            return Err(SessionError::AuthFailed);
        }

        self.state = HandshakeState::NopFlushing;
        Ok(vec![HandshakeAction::SendControl(command::nop_packet().to_vec())])
    }

    fn expect_rpc(&self, packet: &Packet) -> Result<()> {
        if packet.prologue.command() == Some(Command::Rpc) {
            Ok(())
        } else {
            Err(SessionError::UnexpectedCommand {
                state: self.state,
                command: packet.prologue.command_byte(),
            })
        }
    }

    fn invalid_state(&self, operation: &str) -> SessionError {
        SessionError::InvalidState { state: self.state, operation: operation.to_string() }
    }
}

fn truncate_connection_id(value: &[u8]) -> String {
    let end = value.len().min(CONNECTION_ID_MAX);
    String::from_utf8_lossy(&value[..end]).into_owned()
}
