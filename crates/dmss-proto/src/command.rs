//! Canned packets and text bodies for the control handshake.
//!
//! The handshake mixes two generations of the protocol: fixed binary
//! packets (login, NOP) whose meaning lives entirely in the prologue
//! bytes, and `0xf4` requests whose body is CRLF-separated `Key:Value`
//! text. The exact byte values below were taken from wire captures of the
//! DMSS desktop client; the devices check them literally.

use crate::prologue::Prologue;

/// Separator between user and password in the login body.
const CREDENTIAL_SEPARATOR: &str = "&&";

/// Build the login request: a 32-byte prologue followed by
/// `user&&password` (no trailing NUL).
///
/// Prologue layout: `0xa0 0x00 0x00 0x60`, the credential length as
/// u32-LE, sixteen zero bytes, then the constant tail
/// `04 02 03 00 01 a1 aa` the firmware expects.
#[must_use]
pub fn login_packet(user: &str, password: &str) -> Vec<u8> {
    let userpass_size = (user.len() + CREDENTIAL_SEPARATOR.len() + password.len()) as u32;

    let mut packet = Vec::with_capacity(Prologue::SIZE + userpass_size as usize);
    packet.extend_from_slice(&[0xa0, 0x00, 0x00, 0x60]);
    packet.extend_from_slice(&userpass_size.to_le_bytes());
    packet.extend_from_slice(&[0u8; 16]);
    packet.extend_from_slice(&[0x04, 0x02, 0x03, 0x00, 0x01, 0xa1, 0xaa, 0x00]);

    debug_assert_eq!(packet.len(), Prologue::SIZE);

    packet.extend_from_slice(user.as_bytes());
    packet.extend_from_slice(CREDENTIAL_SEPARATOR.as_bytes());
    packet.extend_from_slice(password.as_bytes());
    packet
}

/// The 32-byte keep-alive NOP.
#[must_use]
pub fn nop_packet() -> [u8; Prologue::SIZE] {
    let mut packet = [0u8; Prologue::SIZE];
    packet[0] = 0xa1;
    packet
}

/// Wrap a text body in a `0xf4` request: prologue with the body length
/// at offset 4, followed by the body bytes.
#[must_use]
pub fn rpc_packet(body: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(Prologue::SIZE + body.len());
    packet.push(0xf4);
    packet.extend_from_slice(&[0u8; 3]);
    packet.extend_from_slice(&(body.len() as u32).to_le_bytes());
    packet.extend_from_slice(&[0u8; 24]);
    packet.extend_from_slice(body.as_bytes());
    packet
}

/// Body of the `AddObject` request sent on the control connection.
///
/// Registers a passive control connection with the device; the response
/// carries the `ConnectionID` that every later request must echo.
#[must_use]
pub fn add_object_body() -> String {
    "TransactionID:1\r\n\
     Method:AddObject\r\n\
     ParameterName:Dahua.Device.Network.ControlConnection.Passive\r\n\
     ConnectProtocol:0\r\n\
     \r\n"
        .to_string()
}

/// Body of the `AckSubChannel` request sent on the stream connection.
///
/// Binds the freshly opened stream connection to the login session and
/// the control connection id.
#[must_use]
pub fn ack_subchannel_body(session_id: u32, connection_id: &str) -> String {
    format!(
        "TransactionID:2\r\n\
         Method:GetParameterNames\r\n\
         ParameterName:Dahua.Device.Network.ControlConnection.AckSubChannel\r\n\
         SessionID:{session_id}\r\n\
         ConnectionID:{connection_id}\r\n\
         \r\n"
    )
}

/// Body of the monitor-start request sent on the control connection.
///
/// `state:1` asks the device to begin pushing the given channel and
/// stream tier (0 = main, 1 = sub) over the bound stream connection.
#[must_use]
pub fn monitor_start_body(channel: u32, subchannel: u32, connection_id: &str) -> String {
    format!(
        "TransactionID:100\r\n\
         Method:GetParameterNames\r\n\
         ParameterName:Dahua.Device.Network.Monitor.General\r\n\
         channel:{channel}\r\n\
         state:1\r\n\
         ConnectionID:{connection_id}\r\n\
         stream:{subchannel}\r\n\
         \r\n"
    )
}
