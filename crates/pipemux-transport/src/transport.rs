use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed read half of a transport.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected pair of directional byte streams.
///
/// Bytes written to `writer` arrive at the peer's reader and vice versa. The
/// two halves may be backed by distinct OS objects (two Unix sockets, two
/// named pipes) or by one duplex stream split in two.
pub struct IpcTransport {
    reader: BoxedReader,
    writer: BoxedWriter,
    kind: &'static str,
}

impl IpcTransport {
    /// Wrap an already connected reader/writer pair.
    pub fn new<R, W>(reader: R, writer: W, kind: &'static str) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            kind,
        }
    }

    /// Create two in-memory transports wired to each other.
    ///
    /// `capacity` bounds the bytes buffered in each direction before the
    /// writer waits for the reader.
    pub fn memory_pair(capacity: usize) -> (Self, Self) {
        let (left, right) = tokio::io::duplex(capacity);
        let (left_read, left_write) = tokio::io::split(left);
        let (right_read, right_write) = tokio::io::split(right);
        (
            Self::new(left_read, left_write, "memory"),
            Self::new(right_read, right_write, "memory"),
        )
    }

    /// Transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Split into the owned read and write halves.
    pub fn into_split(self) -> (BoxedReader, BoxedWriter) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for IpcTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcTransport")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn memory_pair_carries_bytes_both_ways() {
        let (left, right) = IpcTransport::memory_pair(64);
        assert_eq!(left.kind(), "memory");

        let (mut left_read, mut left_write) = left.into_split();
        let (mut right_read, mut right_write) = right.into_split();

        left_write.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        right_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        right_write.write_all(b"pong").await.unwrap();
        left_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn shutdown_of_writer_is_eof_for_peer() {
        let (left, right) = IpcTransport::memory_pair(64);
        let (_left_read, mut left_write) = left.into_split();
        let (mut right_read, _right_write) = right.into_split();

        left_write.shutdown().await.unwrap();
        let mut buf = [0u8; 1];
        let read = right_read.read(&mut buf).await.unwrap();
        assert_eq!(read, 0);
    }
}
