//! Session configuration.

use std::time::Duration;

use crate::error::{Result, SessionError};

/// Default DMSS TCP port.
pub const DEFAULT_PORT: u16 = 37777;

/// Default reported latency in milliseconds, sized for the buffering a
/// typical camera needs before playback is smooth.
pub const DEFAULT_LATENCY_MS: u32 = 200;

/// Parameters for one live-view session.
///
/// Captured immutably at [`crate::Session::start`]; the only value that
/// can change while the session runs is the latency, via
/// [`crate::Session::set_latency_ms`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// DNS name or literal IP of the camera or recorder.
    pub host: String,
    /// TCP port (both connections use the same port).
    pub port: u16,
    /// Username to authenticate with.
    pub user: String,
    /// Password to authenticate with.
    pub password: String,
    /// Channel index to read (0-based video input).
    pub channel: u32,
    /// Stream tier within the channel (0 = main, 1 = sub).
    pub subchannel: u32,
    /// Per-read socket timeout in seconds; 0 means no timeout.
    pub timeout_s: u32,
    /// Latency the session reports to the pipeline, in milliseconds.
    pub latency_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            user: "admin".to_string(),
            password: "admin".to_string(),
            channel: 0,
            subchannel: 0,
            timeout_s: 0,
            latency_ms: DEFAULT_LATENCY_MS,
        }
    }
}

impl SessionConfig {
    /// Check that the configuration can produce a working session.
    ///
    /// # Errors
    ///
    /// [`SessionError::Precondition`] when the host is empty or a
    /// credential contains the `&&` wire separator (the login body has no
    /// escaping, so such credentials cannot be transmitted).
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(SessionError::Precondition("host must not be empty".to_string()));
        }

        if self.user.contains("&&") || self.password.contains("&&") {
            return Err(SessionError::Precondition(
                "credentials must not contain the '&&' separator".to_string(),
            ));
        }

        Ok(())
    }

    /// Per-read timeout as a `Duration`; `None` when disabled.
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        if self.timeout_s == 0 { None } else { Some(Duration::from_secs(u64::from(self.timeout_s))) }
    }
}
