use std::path::PathBuf;
use std::time::Duration;

use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// `ERROR_PIPE_BUSY`: every server instance is taken.
const ERROR_PIPE_BUSY: i32 = 231;
const BUSY_RETRY_DELAY: Duration = Duration::from_millis(50);

/// One listening end of a pipe, backed by a Windows named pipe.
///
/// Always holds one unconnected server instance so clients never observe a
/// missing pipe between accepts.
pub struct NamedPipeListener {
    name: String,
    pending: NamedPipeServer,
}

impl NamedPipeListener {
    /// Create the first instance of `name` (`\\.\pipe\...`).
    pub fn bind(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let pending = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&name)
            .map_err(|source| TransportError::Bind {
                path: PathBuf::from(&name),
                source,
            })?;
        info!(%name, "listening on named pipe");
        Ok(Self { name, pending })
    }

    /// Wait for a client on the pending instance and hand it out.
    pub async fn accept(&mut self) -> Result<NamedPipeServer> {
        self.pending
            .connect()
            .await
            .map_err(|source| TransportError::Accept {
                path: PathBuf::from(&self.name),
                source,
            })?;
        let next = ServerOptions::new()
            .create(&self.name)
            .map_err(|source| TransportError::Bind {
                path: PathBuf::from(&self.name),
                source,
            })?;
        debug!(name = %self.name, "accepted named pipe client");
        Ok(std::mem::replace(&mut self.pending, next))
    }

    /// Open the client end, waiting while all instances are busy.
    pub async fn connect(name: &str) -> Result<NamedPipeClient> {
        loop {
            match ClientOptions::new().open(name) {
                Ok(client) => {
                    debug!(%name, "connected to named pipe");
                    return Ok(client);
                }
                Err(err) if err.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                    tokio::time::sleep(BUSY_RETRY_DELAY).await;
                }
                Err(source) => {
                    return Err(TransportError::Connect {
                        path: PathBuf::from(name),
                        source,
                    })
                }
            }
        }
    }

    /// The pipe name this listener serves.
    pub fn name(&self) -> &str {
        &self.name
    }
}
