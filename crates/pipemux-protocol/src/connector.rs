use std::path::{Path, PathBuf};

use futures_core::future::BoxFuture;
use pipemux_transport::{IpcTransport, TransportError};

use crate::connection::{Connection, ConnectionConfig};
use crate::error::Result;
use crate::source::TransportSource;

/// Client-side source: opens `<base>.incoming` then `<base>.outgoing`.
#[derive(Debug, Clone)]
pub struct PipeConnector {
    base: PathBuf,
}

impl PipeConnector {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl TransportSource for PipeConnector {
    fn open(&self) -> BoxFuture<'_, std::result::Result<IpcTransport, TransportError>> {
        Box::pin(pipemux_transport::connect(&self.base))
    }
}

/// Connect to the pipe pair served at `base`.
pub async fn connect(base: impl Into<PathBuf>) -> Result<Connection> {
    connect_with_config(base, ConnectionConfig::default()).await
}

/// Connect with explicit configuration.
pub async fn connect_with_config(
    base: impl Into<PathBuf>,
    config: ConnectionConfig,
) -> Result<Connection> {
    let connection = Connection::builder()
        .source(PipeConnector::new(base))
        .config(config)
        .build();
    connection.connect().await?;
    Ok(connection)
}
