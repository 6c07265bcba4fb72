use futures_core::future::BoxFuture;
use pipemux_transport::{IpcTransport, TransportError};

/// Produces a fresh transport each time a connection (re)connects.
///
/// Clients connect to a pipe pair; servers accept on one. Tests may hand out
/// in-memory transports.
pub trait TransportSource: Send + Sync + 'static {
    fn open(&self) -> BoxFuture<'_, Result<IpcTransport, TransportError>>;
}
