//! Pipe-pair naming, listening and connecting.
//!
//! `<base>.incoming` carries client-to-server bytes and `<base>.outgoing`
//! carries server-to-client bytes, so the client's writer is the server's
//! reader and vice versa.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::transport::IpcTransport;

#[cfg(windows)]
use crate::named_pipe::NamedPipeListener;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// Suffix of the client-to-server pipe.
pub const INCOMING_SUFFIX: &str = ".incoming";
/// Suffix of the server-to-client pipe.
pub const OUTGOING_SUFFIX: &str = ".outgoing";

#[cfg(windows)]
const PIPE_PREFIX: &str = r"\\.\pipe\";

/// Resolve the `(incoming, outgoing)` endpoint names for a base name.
///
/// On Windows a bare base name is placed under `\\.\pipe\`.
pub fn pipe_names(base: impl AsRef<Path>) -> (PathBuf, PathBuf) {
    let base = base.as_ref();
    #[cfg(windows)]
    let base = {
        let text = base.to_string_lossy();
        if text.starts_with(PIPE_PREFIX) {
            base.to_path_buf()
        } else {
            PathBuf::from(format!("{PIPE_PREFIX}{text}"))
        }
    };
    (
        with_suffix(base.as_ref(), INCOMING_SUFFIX),
        with_suffix(base.as_ref(), OUTGOING_SUFFIX),
    )
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Server side of a pipe pair.
///
/// Each [`accept`](Self::accept) yields one transport: the reader accepted on
/// the incoming pipe and the writer accepted on the outgoing pipe.
pub struct PipeListener {
    base: PathBuf,
    #[cfg(unix)]
    incoming: UnixDomainSocket,
    #[cfg(unix)]
    outgoing: UnixDomainSocket,
    #[cfg(windows)]
    incoming: NamedPipeListener,
    #[cfg(windows)]
    outgoing: NamedPipeListener,
}

impl PipeListener {
    /// Bind both pipes of `base`.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(unix)]
    pub fn bind(base: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(base, UnixDomainSocket::DEFAULT_SOCKET_MODE)
    }

    /// Bind both pipes of `base` with an explicit socket file mode.
    #[cfg(unix)]
    pub fn bind_with_mode(base: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let (incoming, outgoing) = pipe_names(&base);
        let incoming = UnixDomainSocket::bind_with_mode(incoming, mode)?;
        let outgoing = UnixDomainSocket::bind_with_mode(outgoing, mode)?;
        info!(?base, "pipe pair ready");
        Ok(Self {
            base,
            incoming,
            outgoing,
        })
    }

    /// Create both named pipes of `base`.
    #[cfg(windows)]
    pub fn bind(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let (incoming, outgoing) = pipe_names(&base);
        let incoming = NamedPipeListener::bind(incoming.to_string_lossy())?;
        let outgoing = NamedPipeListener::bind(outgoing.to_string_lossy())?;
        info!(?base, "pipe pair ready");
        Ok(Self {
            base,
            incoming,
            outgoing,
        })
    }

    /// Wait for a client to open both pipes.
    ///
    /// The two halves are accepted independently and paired by arrival
    /// order. Clients must connect one at a time: two clients racing on the
    /// same base can end up with each other's outgoing half.
    pub async fn accept(&mut self) -> Result<IpcTransport> {
        let reader = self.incoming.accept().await?;
        let writer = self.outgoing.accept().await?;
        info!(base = ?self.base, "client attached");
        Ok(IpcTransport::new(reader, writer, Self::KIND))
    }

    /// The base name both pipes derive from.
    pub fn base(&self) -> &Path {
        &self.base
    }

    #[cfg(unix)]
    const KIND: &'static str = "unix-domain-socket";
    #[cfg(windows)]
    const KIND: &'static str = "named-pipe";
}

/// Open the client side of the pipe pair served at `base`.
///
/// Opens `incoming` first so the order matches the server's accepts.
pub async fn connect(base: impl AsRef<Path>) -> Result<IpcTransport> {
    let (incoming, outgoing) = pipe_names(base.as_ref());

    #[cfg(unix)]
    let (writer, reader) = (
        UnixDomainSocket::connect(&incoming).await?,
        UnixDomainSocket::connect(&outgoing).await?,
    );
    #[cfg(windows)]
    let (writer, reader) = (
        NamedPipeListener::connect(&incoming.to_string_lossy()).await?,
        NamedPipeListener::connect(&outgoing.to_string_lossy()).await?,
    );

    Ok(IpcTransport::new(reader, writer, PipeListener::KIND))
}

#[cfg(all(test, unix))]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn temp_base(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pmx-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("pipe")
    }

    #[test]
    fn pipe_names_append_direction_suffixes() {
        let (incoming, outgoing) = pipe_names("/run/app/bot");
        assert_eq!(incoming, PathBuf::from("/run/app/bot.incoming"));
        assert_eq!(outgoing, PathBuf::from("/run/app/bot.outgoing"));
    }

    #[tokio::test]
    async fn accept_and_connect_wire_directions_crosswise() {
        let base = temp_base("pipe-pair");
        let mut listener = PipeListener::bind(&base).unwrap();
        let (incoming, outgoing) = pipe_names(&base);
        assert!(incoming.exists());
        assert!(outgoing.exists());

        let client_base = base.clone();
        let client = tokio::spawn(async move {
            let transport = connect(&client_base).await.unwrap();
            assert_eq!(transport.kind(), "unix-domain-socket");
            let (mut reader, mut writer) = transport.into_split();
            writer.write_all(b"to-server").await.unwrap();
            let mut buf = [0u8; 9];
            reader.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"to-client");
        });

        let (mut reader, mut writer) = listener.accept().await.unwrap().into_split();
        let mut buf = [0u8; 9];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"to-server");
        writer.write_all(b"to-client").await.unwrap();

        client.await.unwrap();
        drop(listener);
        assert!(!incoming.exists());
        assert!(!outgoing.exists());
        if let Some(dir) = base.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn connect_without_listener_fails() {
        let base = temp_base("pipe-missing");
        let err = connect(&base).await.unwrap_err();
        assert!(matches!(err, crate::TransportError::Connect { .. }));
        if let Some(dir) = base.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
