//! Wire formats for the DMSS camera protocol.
//!
//! DMSS is the TCP protocol spoken by Dahua IP cameras and network video
//! recorders on port 37777. Every message on the wire is an *outer packet*:
//! a fixed 32-byte prologue followed by a length-prefixed body. Live media
//! rides inside outer packets as DHAV, a per-frame wrapper carrying codec
//! and timing metadata.
//!
//! This crate is pure data: parsing and encoding only, no sockets and no
//! protocol state. The layers are:
//!
//! - [`Prologue`]: the 32-byte outer packet header (little-endian fields)
//! - [`Command`]: the leading command byte of a prologue
//! - [`command`]: canned packets and text bodies for the login handshake
//!   and the `Method:`-style control requests
//! - [`text`]: `Key:Value` parsing for control responses
//! - [`dhav`]: the DHAV frame wrapper (fixed header, extension records,
//!   trailer) and codec classification
//!
//! The session state machine and the demultiplexer that consume these
//! types live in `dmss-client`.

pub mod command;
pub mod dhav;
mod errors;
mod prologue;
pub mod text;

pub use errors::{ProtocolError, Result};
pub use prologue::{Command, Prologue};
