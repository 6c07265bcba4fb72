use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::header::{PacketConfig, PacketHeader, HEADER_SIZE};
use crate::payload::{Packet, MAX_PACKET_SIZE};

/// Reads packets from any `AsyncRead` stream.
///
/// Headers and content are read separately so the caller can route content
/// bytes straight into a per-request buffer.
pub struct PacketReader<R> {
    inner: R,
    config: PacketConfig,
    chunk: Box<[u8; MAX_PACKET_SIZE]>,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: R, config: PacketConfig) -> Self {
        Self {
            inner,
            config,
            chunk: Box::new([0u8; MAX_PACKET_SIZE]),
        }
    }

    /// Read the next header, including its type header.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at end of stream.
    pub async fn read_header(&mut self) -> Result<PacketHeader> {
        let mut fixed = [0u8; HEADER_SIZE];
        self.fill(&mut fixed).await?;
        let mut header = PacketHeader::decode(&fixed);

        if header.type_header_length() == 1 {
            let mut type_header = [0u8; 1];
            self.fill(&mut type_header).await?;
            header.type_header = Some(type_header[0]);
        }

        let length = header.length as usize;
        if length > self.config.max_packet_length {
            return Err(FrameError::PacketTooLarge {
                size: length,
                max: self.config.max_packet_length,
            });
        }

        trace!(
            request_id = %header.request_id,
            payload_type = header.payload_type,
            length,
            is_end = header.is_end,
            "read packet header"
        );
        Ok(header)
    }

    /// Read `length` content bytes in chunks of at most [`MAX_PACKET_SIZE`],
    /// handing each chunk to `sink`.
    ///
    /// Returns the number of bytes read, which always equals `length` on
    /// success.
    pub async fn read_content<F>(&mut self, length: u32, mut sink: F) -> Result<usize>
    where
        F: FnMut(&[u8]),
    {
        let length = length as usize;
        let mut total = 0usize;
        while total < length {
            let want = (length - total).min(MAX_PACKET_SIZE);
            let read = match self.inner.read(&mut self.chunk[..want]).await {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };
            sink(&self.chunk[..read]);
            total += read;
        }
        Ok(total)
    }

    /// Read one whole packet into its own buffer.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        let header = self.read_header().await?;
        let mut content = BytesMut::with_capacity(header.length as usize);
        self.read_content(header.length, |chunk| content.extend_from_slice(chunk))
            .await?;
        Ok(Packet {
            header,
            content: content.freeze(),
        })
    }

    /// Current reader configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]).await {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }
}
