//! Session driver.
//!
//! Owns the two TCP connections, executes the handshake actions, and
//! pumps stream bytes through the demultiplexer. One task drives
//! [`Session::next_event`] in a loop; the control connection is only
//! touched during the handshake and by the keep-alive.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use dmss_proto::command;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::SessionConfig,
    demux::{Demuxer, StreamEvent},
    error::{Result, SessionError},
    handshake::{Handshake, HandshakeAction, HandshakeState},
    wire,
};

/// How long the control connection may stay quiet before a NOP is sent.
/// Cameras reap passive connections that fall silent.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Shared handle for updating the reported latency from another thread.
///
/// Updates take effect before the next latency query; frames in flight
/// are not retimed.
#[derive(Debug, Clone)]
pub struct LatencyHandle(Arc<AtomicU32>);

impl LatencyHandle {
    /// Set the reported latency in milliseconds.
    pub fn set(&self, latency_ms: u32) {
        self.0.store(latency_ms, Ordering::Relaxed);
    }

    /// Current reported latency in milliseconds.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A running live-view session.
///
/// Created by [`Session::start`], which performs the whole login and
/// stream-binding handshake before returning. Afterwards the caller
/// pulls [`StreamEvent`]s in a loop; the session never spawns tasks of
/// its own.
///
/// Both sockets are owned exclusively by the session and closed on drop
/// or after [`Session::stop`].
#[derive(Debug)]
pub struct Session {
    control: TcpStream,
    stream: TcpStream,
    demux: Demuxer,
    cancel: CancellationToken,
    read_timeout: Option<Duration>,
    latency_ms: Arc<AtomicU32>,
    session_id: u32,
    connection_id: String,
    last_control_write: Instant,
}

impl Session {
    /// Connect, authenticate, and start the live stream.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Precondition`] on an invalid configuration
    /// - [`SessionError::AuthFailed`] if the device rejects the login
    /// - [`SessionError::Io`] / [`SessionError::Protocol`] on transport
    ///   or handshake failures
    pub async fn start(config: SessionConfig) -> Result<Self> {
        Self::start_with_token(config, CancellationToken::new()).await
    }

    /// Like [`Session::start`], with an externally owned cancellation
    /// token. Firing the token interrupts any pending socket operation
    /// and stops the session.
    pub async fn start_with_token(
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let read_timeout = config.read_timeout();

        debug!(host = %config.host, port = config.port, "opening control connection");
        let mut control = connect(&config.host, config.port, &cancel, read_timeout).await?;
        let mut stream: Option<TcpStream> = None;

        let mut handshake = Handshake::new(&config);
        let mut pending: VecDeque<HandshakeAction> = handshake.start()?.into();
        let mut last_control_write = Instant::now();

        loop {
            while let Some(action) = pending.pop_front() {
                match action {
                    HandshakeAction::SendControl(bytes) => {
                        wire::send(&mut control, &bytes, &cancel).await?;
                        last_control_write = Instant::now();
                    },
                    HandshakeAction::SendStream(bytes) => {
                        let socket = stream.as_mut().ok_or_else(|| {
                            SessionError::Protocol(
                                "stream write requested before connect".to_string(),
                            )
                        })?;
                        wire::send(socket, &bytes, &cancel).await?;
                    },
                    HandshakeAction::ConnectStream => {
                        debug!(host = %config.host, port = config.port, "opening stream connection");
                        let socket =
                            connect(&config.host, config.port, &cancel, read_timeout).await?;
                        stream = Some(socket);
                        pending.extend(handshake.stream_connected()?);
                    },
                    HandshakeAction::Established => {
                        let stream = stream.ok_or_else(|| {
                            SessionError::Protocol("established without stream".to_string())
                        })?;
                        let session_id = handshake.session_id().unwrap_or_default();
                        let connection_id =
                            handshake.connection_id().unwrap_or_default().to_string();

                        info!(
                            session_id,
                            connection_id = %connection_id,
                            channel = config.channel,
                            subchannel = config.subchannel,
                            "stream started"
                        );

                        return Ok(Self {
                            control,
                            stream,
                            demux: Demuxer::new(),
                            cancel,
                            read_timeout,
                            latency_ms: Arc::new(AtomicU32::new(config.latency_ms)),
                            session_id,
                            connection_id,
                            last_control_write,
                        });
                    },
                }
            }

            let packet = match handshake.state() {
                HandshakeState::AckSubChannelSent => {
                    let socket = stream.as_mut().ok_or_else(|| {
                        SessionError::Protocol("stream read requested before connect".to_string())
                    })?;
                    wire::recv_packet(socket, &cancel, read_timeout).await?
                },
                _ => wire::recv_packet(&mut control, &cancel, read_timeout).await?,
            };

            debug!(
                command = packet.prologue.command_byte(),
                body = packet.body.len(),
                state = ?handshake.state(),
                "handshake packet"
            );

            pending.extend(match handshake.state() {
                HandshakeState::AckSubChannelSent => handshake.handle_stream_packet(&packet)?,
                _ => handshake.handle_control_packet(&packet)?,
            });
        }
    }

    /// Pull the next stream event, blocking until one is available.
    ///
    /// Frames come out in device order. The keep-alive NOP rides on this
    /// loop: whenever more than a second has passed since the last
    /// control-connection write, one is sent before the next stream
    /// read.
    ///
    /// # Errors
    ///
    /// Any [`SessionError`]; all of them are fatal to the session.
    pub async fn next_event(&mut self) -> Result<StreamEvent> {
        loop {
            if let Some(event) = self.demux.poll_event() {
                if let StreamEvent::Warning(warning) = &event {
                    warn!(%warning, "stream warning");
                }
                return Ok(event);
            }

            self.keep_alive().await?;

            let packet =
                wire::recv_packet(&mut self.stream, &self.cancel, self.read_timeout).await?;
            self.demux.push_packet(&packet, Instant::now());
        }
    }

    /// Send a NOP on the control connection if it has been quiet too
    /// long. The device's 0xb1 acknowledgements are left unread; they
    /// are drained by the kernel buffer and carry no payload.
    async fn keep_alive(&mut self) -> Result<()> {
        if self.last_control_write.elapsed() >= KEEP_ALIVE_INTERVAL {
            debug!("sending keep-alive nop");
            wire::send(&mut self.control, &command::nop_packet(), &self.cancel).await?;
            self.last_control_write = Instant::now();
        }
        Ok(())
    }

    /// Stop the session: fires the cancellation token, interrupting any
    /// pending read promptly. The sockets close when the session drops.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// The session's cancellation token, for wiring into an external
    /// shutdown path.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Session id assigned by the device at login.
    #[must_use]
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Connection id assigned in the AddObject response.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Handle for updating the reported latency from another thread.
    #[must_use]
    pub fn latency_handle(&self) -> LatencyHandle {
        LatencyHandle(Arc::clone(&self.latency_ms))
    }

    /// Set the reported latency in milliseconds.
    pub fn set_latency_ms(&self, latency_ms: u32) {
        self.latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    /// Current reported latency in milliseconds.
    #[must_use]
    pub fn latency_ms(&self) -> u32 {
        self.latency_ms.load(Ordering::Relaxed)
    }

    /// Total pipeline latency: the session's own latency added to the
    /// upstream bounds, `min == max` for the session's share.
    #[must_use]
    pub fn latency(
        &self,
        upstream_min: Duration,
        upstream_max: Option<Duration>,
    ) -> (Duration, Option<Duration>) {
        let own = Duration::from_millis(u64::from(self.latency_ms()));
        (upstream_min + own, upstream_max.map(|max| max + own))
    }
}

/// Open a TCP connection, honoring cancellation and the per-read
/// timeout. Nagle is disabled; control requests are tiny and the stream
/// is latency-sensitive.
async fn connect(
    host: &str,
    port: u16,
    cancel: &CancellationToken,
    limit: Option<Duration>,
) -> Result<TcpStream> {
    let socket = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(SessionError::Cancelled),
        result = wire::maybe_timeout(limit, TcpStream::connect((host, port))) => result?,
    };

    socket.set_nodelay(true)?;
    Ok(socket)
}
