//! Live-view client for DMSS cameras and recorders.
//!
//! Connects to a Dahua/DMSS-family device over TCP, authenticates,
//! subscribes to one channel/subchannel, and produces a timestamped,
//! demultiplexed stream of video and audio frames ready for a decoder.
//!
//! # Architecture
//!
//! Protocol logic is Sans-IO: the handshake ([`Handshake`]) and the
//! demultiplexer ([`Demuxer`]) are pure state machines that consume
//! packets and produce actions or events. The [`Session`] driver owns the
//! two TCP connections (control and stream), executes handshake actions,
//! and pumps stream bytes through the demultiplexer.
//!
//! # Components
//!
//! - [`SessionConfig`]: connection parameters (host, credentials,
//!   channel, timeouts, latency)
//! - [`Handshake`]: login and stream-binding state machine
//! - [`Demuxer`]: resynchronizing DHAV parser emitting [`StreamEvent`]s
//! - [`PtsTracker`]: maps the device's wrapping 16-bit clock onto a
//!   monotone, pipeline-anchored presentation time
//! - [`Session`]: tokio driver tying the above to sockets
//!
//! # Example
//!
//! ```no_run
//! use dmss_client::{Session, SessionConfig, StreamEvent};
//!
//! # async fn run() -> dmss_client::Result<()> {
//! let config = SessionConfig {
//!     host: "192.168.1.108".to_string(),
//!     user: "admin".to_string(),
//!     password: "admin".to_string(),
//!     ..SessionConfig::default()
//! };
//!
//! let mut session = Session::start(config).await?;
//! loop {
//!     match session.next_event().await? {
//!         StreamEvent::Frame(_frame) => { /* hand to the decoder */ }
//!         _other => { /* caps changes, segment start, warnings */ }
//!     }
//! }
//! # }
//! ```

pub mod config;
pub mod demux;
mod error;
pub mod handshake;
pub mod session;
pub mod timestamp;
pub mod wire;

pub use config::SessionConfig;
pub use demux::{DemuxWarning, Demuxer, MediaFrame, MediaKind, StreamEvent};
pub use dmss_proto::dhav::{AudioCodec, AudioRate, VideoCodec};
pub use error::{Result, SessionError};
pub use handshake::{Handshake, HandshakeAction, HandshakeState};
pub use session::{LatencyHandle, Session};
pub use timestamp::{PtsTracker, PtsUpdate};
pub use wire::Packet;
