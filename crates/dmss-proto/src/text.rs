//! `Key:Value` parsing for control response bodies.
//!
//! Responses to `0xf4` requests are CRLF-separated `Key:Value` lines
//! terminated by a blank line. Devices order the lines freely, so lookup
//! is by key; keys are literal prefixes including the colon (`FaultCode:`)
//! with no wildcard support. Values run to the next CR (or LF, or end of
//! body — some firmwares are sloppy about the final line ending).

use crate::errors::{ProtocolError, Result};

/// Key of the status line every response carries.
pub const FAULT_CODE_KEY: &str = "FaultCode:";

/// Key of the connection id line in the `AddObject` response.
pub const CONNECTION_ID_KEY: &str = "ConnectionID:";

/// The value a successful `FaultCode:` line carries.
const OK_STATUS: &[u8] = b"OK";

/// Find the first line starting with `key` and return its value up to the
/// next CR/LF. `None` if no line matches.
#[must_use]
pub fn find_value<'a>(body: &'a [u8], key: &str) -> Option<&'a [u8]> {
    let key = key.as_bytes();
    let mut offset = 0;

    while offset < body.len() {
        let line = &body[offset..];
        if line.starts_with(key) {
            let value = &line[key.len()..];
            let end = value
                .iter()
                .position(|&b| b == b'\r' || b == b'\n')
                .unwrap_or(value.len());
            return Some(&value[..end]);
        }

        // Skip to just past the next LF.
        match line.iter().position(|&b| b == b'\n') {
            Some(eol) => offset += eol + 1,
            None => break,
        }
    }

    None
}

/// Check that the response carries `FaultCode:OK`.
///
/// # Errors
///
/// - [`ProtocolError::MissingKey`] if there is no `FaultCode:` line
/// - [`ProtocolError::Fault`] if the value is anything but `OK`
pub fn require_fault_code_ok(body: &[u8]) -> Result<()> {
    let value = find_value(body, FAULT_CODE_KEY)
        .ok_or(ProtocolError::MissingKey("FaultCode:"))?;

    if value == OK_STATUS {
        Ok(())
    } else {
        Err(ProtocolError::Fault(String::from_utf8_lossy(value).into_owned()))
    }
}
