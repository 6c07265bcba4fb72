/// Errors that can occur while reading or writing packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A packet header declares more content than the reader accepts.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// A packet's content does not match the length in its header.
    #[error("packet length mismatch (header says {declared}, content has {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// An I/O error occurred on the underlying stream.
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended or accepted zero bytes.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
