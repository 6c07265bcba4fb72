use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::header::HEADER_SIZE;
use crate::payload::{Packet, MAX_PACKET_SIZE};

/// Writes packets to any `AsyncWrite` stream.
///
/// Each packet is written as header, type header, then content in chunks of
/// at most [`MAX_PACKET_SIZE`] bytes. A single writer must not be shared by
/// concurrent tasks; callers serialize access.
pub struct PacketWriter<W> {
    inner: W,
    buf: BytesMut,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_SIZE + 1),
        }
    }

    /// Write one complete packet and flush.
    ///
    /// A write that accepts zero bytes means the peer is gone and yields
    /// `Err(FrameError::ConnectionClosed)`.
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let declared = packet.header.length as usize;
        if declared != packet.content.len() {
            return Err(FrameError::LengthMismatch {
                declared,
                actual: packet.content.len(),
            });
        }

        self.buf.clear();
        packet.header.encode(&mut self.buf);
        write_all(&mut self.inner, &self.buf).await?;

        for chunk in packet.content.chunks(MAX_PACKET_SIZE) {
            write_all(&mut self.inner, chunk).await?;
        }

        self.flush().await?;
        trace!(
            request_id = %packet.header.request_id,
            payload_type = packet.header.payload_type,
            length = declared,
            is_end = packet.header.is_end,
            "wrote packet"
        );
        Ok(())
    }

    /// Flush the underlying stream.
    pub async fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush().await {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Close the write direction so the peer observes end of stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(FrameError::Io)
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

async fn write_all<W: AsyncWrite + Unpin>(inner: &mut W, data: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < data.len() {
        match inner.write(&data[offset..]).await {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}
