//! Outer packet framing over a socket.
//!
//! Two receive shapes exist on the wire: a bare 32-byte prologue, and a
//! prologue followed by a length-prefixed body. Both are read with
//! explicit short-read loops so that a clean close at byte zero is
//! distinguishable from a connection dying mid-packet.
//!
//! Every read is a suspension point guarded by the session's cancellation
//! token and, when configured, the per-read timeout. Cancellation wins
//! over ready data (`biased` select) so that stopping a session is
//! prompt even on a firehose stream.

use std::{future::Future, io, time::Duration};

use bytes::{Bytes, BytesMut};
use dmss_proto::Prologue;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};

/// A complete outer packet: 32-byte prologue plus its body.
#[derive(Debug, Clone)]
pub struct Packet {
    /// The parsed 32-byte prologue.
    pub prologue: Prologue,
    /// Body bytes; length equals `prologue.body_size()`.
    pub body: Bytes,
}

impl Packet {
    /// Total wire size of the packet.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        Prologue::SIZE + self.body.len()
    }
}

/// Apply the optional per-read timeout to an I/O future.
pub(crate) async fn maybe_timeout<T, F>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "socket read timed out")),
        },
        None => fut.await,
    }
}

/// Read some bytes, honoring cancellation and the read timeout.
async fn read_some<R>(
    reader: &mut R,
    buf: &mut [u8],
    cancel: &CancellationToken,
    limit: Option<Duration>,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SessionError::Cancelled),
        result = maybe_timeout(limit, reader.read(buf)) => Ok(result?),
    }
}

/// Read exactly `buf.len()` bytes.
///
/// A peer close before the first byte is [`SessionError::ConnectionClosed`];
/// a close after that is a plain unexpected-EOF I/O error.
async fn read_exact<R>(
    reader: &mut R,
    buf: &mut [u8],
    cancel: &CancellationToken,
    limit: Option<Duration>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut offset = 0;

    while offset != buf.len() {
        let size = read_some(reader, &mut buf[offset..], cancel, limit).await?;
        if size == 0 {
            if offset == 0 {
                return Err(SessionError::ConnectionClosed);
            }
            return Err(SessionError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-packet",
            )));
        }
        offset += size;
    }

    Ok(())
}

/// Receive just the 32-byte prologue of the next packet.
///
/// # Errors
///
/// - [`SessionError::ConnectionClosed`] if the peer closes cleanly
///   before the first byte
/// - [`SessionError::Io`] on any other short read, I/O failure, or
///   timeout
/// - [`SessionError::Cancelled`] if the cancellation token fires
/// - [`SessionError::Protocol`] if the prologue claims an oversized body
pub async fn recv_prologue<R>(
    reader: &mut R,
    cancel: &CancellationToken,
    limit: Option<Duration>,
) -> Result<Prologue>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = [0u8; Prologue::SIZE];
    read_exact(reader, &mut bytes, cancel, limit).await?;

    Ok(*Prologue::from_bytes(&bytes)?)
}

/// Receive a full packet: prologue plus `body_size` body bytes.
///
/// Same error semantics as [`recv_prologue`]; a close inside the body is
/// an I/O error, never `ConnectionClosed`.
pub async fn recv_packet<R>(
    reader: &mut R,
    cancel: &CancellationToken,
    limit: Option<Duration>,
) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let prologue = recv_prologue(reader, cancel, limit).await?;
    let body_size = prologue.body_size() as usize;

    let mut body = BytesMut::zeroed(body_size);
    if body_size > 0 {
        read_exact(reader, &mut body, cancel, limit).await.map_err(|err| match err {
            // A close between prologue and body is still a truncated packet.
            SessionError::ConnectionClosed => SessionError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-packet",
            )),
            other => other,
        })?;
    }

    Ok(Packet { prologue, body: body.freeze() })
}

/// Write all of `bytes`, honoring cancellation.
pub async fn send<W>(writer: &mut W, bytes: &[u8], cancel: &CancellationToken) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SessionError::Cancelled),
        result = writer.write_all(bytes) => {
            result?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use dmss_proto::{command, Command};
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn recv_full_packet() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();

        let packet = command::rpc_packet("FaultCode:OK\r\n\r\n");
        server.write_all(&packet).await.unwrap();

        let received = recv_packet(&mut client, &cancel, None).await.unwrap();
        assert_eq!(received.prologue.command(), Some(Command::Rpc));
        assert_eq!(received.body.as_ref(), b"FaultCode:OK\r\n\r\n");
        assert_eq!(received.wire_size(), packet.len());
    }

    #[tokio::test]
    async fn recv_across_fragmented_writes() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();

        let packet = command::rpc_packet("TransactionID:1\r\n\r\n");
        let (first, rest) = packet.split_at(7);
        let first = first.to_vec();
        let rest = rest.to_vec();

        let writer = tokio::spawn(async move {
            server.write_all(&first).await.unwrap();
            tokio::task::yield_now().await;
            server.write_all(&rest).await.unwrap();
        });

        let received = recv_packet(&mut client, &cancel, None).await.unwrap();
        assert_eq!(received.body.as_ref(), b"TransactionID:1\r\n\r\n");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn clean_close_at_boundary() {
        let (mut client, server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();

        drop(server);

        let result = recv_prologue(&mut client, &cancel, None).await;
        assert!(matches!(result, Err(SessionError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn close_mid_prologue_is_io_error() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();

        server.write_all(&[0xbc, 0, 0, 0]).await.unwrap();
        drop(server);

        let result = recv_prologue(&mut client, &cancel, None).await;
        match result {
            Err(SessionError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_mid_body_is_io_error() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();

        let packet = command::rpc_packet("Method:AddObject\r\n\r\n");
        server.write_all(&packet[..40]).await.unwrap();
        drop(server);

        let result = recv_packet(&mut client, &cancel, None).await;
        match result {
            Err(SessionError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_read() {
        let (mut client, _server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });

        let result = recv_prologue(&mut client, &cancel, None).await;
        assert!(matches!(result, Err(SessionError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout_surfaces_as_timed_out() {
        let (mut client, _server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();

        let result =
            recv_prologue(&mut client, &cancel, Some(Duration::from_millis(50))).await;
        match result {
            Err(err) => assert!(err.is_timeout()),
            Ok(_) => panic!("expected timeout"),
        }
    }

    #[tokio::test]
    async fn oversized_body_rejected_before_allocation() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();

        let mut prologue = [0u8; Prologue::SIZE];
        prologue[0] = 0xbc;
        prologue[4..8].copy_from_slice(&(Prologue::MAX_BODY_SIZE + 1).to_le_bytes());
        server.write_all(&prologue).await.unwrap();

        let result = recv_prologue(&mut client, &cancel, None).await;
        assert!(matches!(result, Err(SessionError::Protocol(_))));
    }
}
