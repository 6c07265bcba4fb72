//! Directional pipe-pair transports.
//!
//! A pipemux connection runs over two one-way byte streams: the client writes
//! to `<base>.incoming` and reads from `<base>.outgoing`. This crate binds,
//! accepts and connects those pairs on each platform:
//! - Unix domain sockets (Linux/macOS)
//! - Named pipes (Windows)
//! - In-memory pipes for tests
//!
//! This is the lowest layer of pipemux. Everything else builds on top of
//! the [`IpcTransport`] type provided here.

pub mod error;
pub mod pipe;
pub mod transport;

#[cfg(unix)]
pub mod uds;

#[cfg(windows)]
pub mod named_pipe;

pub use error::{Result, TransportError};
pub use pipe::{connect, pipe_names, PipeListener, INCOMING_SUFFIX, OUTGOING_SUFFIX};
pub use transport::{BoxedReader, BoxedWriter, IpcTransport};

#[cfg(unix)]
pub use uds::UnixDomainSocket;

#[cfg(windows)]
pub use named_pipe::NamedPipeListener;
