use std::path::{Path, PathBuf};

use futures_core::future::BoxFuture;
use pipemux_transport::{IpcTransport, PipeListener, TransportError};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::source::TransportSource;

/// Server-side source: each `open` accepts the next client on the bound
/// pipe pair.
pub struct PipeAcceptor {
    base: PathBuf,
    listener: Mutex<PipeListener>,
}

impl PipeAcceptor {
    /// Bind `<base>.incoming` and `<base>.outgoing`.
    pub fn bind(base: impl AsRef<Path>) -> Result<Self> {
        let listener = PipeListener::bind(base.as_ref())?;
        Ok(Self::from_listener(listener))
    }

    /// Bind with an explicit socket file mode.
    #[cfg(unix)]
    pub fn bind_with_mode(base: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let listener = PipeListener::bind_with_mode(base.as_ref(), mode)?;
        Ok(Self::from_listener(listener))
    }

    pub fn from_listener(listener: PipeListener) -> Self {
        Self {
            base: listener.base().to_path_buf(),
            listener: Mutex::new(listener),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl TransportSource for PipeAcceptor {
    fn open(&self) -> BoxFuture<'_, std::result::Result<IpcTransport, TransportError>> {
        Box::pin(async move { self.listener.lock().await.accept().await })
    }
}
