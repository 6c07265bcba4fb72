use std::io;
use std::path::PathBuf;

/// Errors raised while opening or accepting a pipe pair.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create the listening end of a pipe.
    #[error("failed to bind pipe {path}: {source}")]
    Bind { path: PathBuf, source: io::Error },

    /// Failed to open the client end of a pipe.
    #[error("failed to connect pipe {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },

    /// Failed to accept a client on a listening pipe.
    #[error("failed to accept on pipe {path}: {source}")]
    Accept { path: PathBuf, source: io::Error },

    /// An I/O error outside bind/connect/accept.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl TransportError {
    /// The underlying OS error, when there is one.
    pub fn io_source(&self) -> Option<&io::Error> {
        match self {
            Self::Bind { source, .. }
            | Self::Connect { source, .. }
            | Self::Accept { source, .. }
            | Self::Io(source) => Some(source),
            Self::PathTooLong { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
