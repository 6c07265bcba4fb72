//! Ownership of one physical transport at a time.
//!
//! Outbound packets go through an unbounded queue drained by a single writer
//! task. A single reader task deframes inbound bytes and hands each packet to
//! the installed [`PacketHandler`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::{Bytes, BytesMut};
use pipemux_frame::{FrameError, Packet, PacketConfig, PacketHeader, PacketReader, PacketWriter};
use pipemux_transport::{BoxedReader, BoxedWriter, IpcTransport};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ProtocolError, Result};

const EVENT_CAPACITY: usize = 16;

/// Receives inbound packets from the reader task.
///
/// Calls happen on the reader task, one packet at a time, so
/// implementations must not block.
pub trait PacketHandler: Send + Sync + 'static {
    /// Buffer that will receive the content of the packet described by
    /// `header`.
    fn content_buffer(&self, header: &PacketHeader) -> ContentBuffer;

    /// The packet's content has been read into `buffer`.
    fn on_packet(&self, header: PacketHeader, buffer: &ContentBuffer, bytes_read: usize);

    /// The transport went away. Called before the event is broadcast.
    fn on_disconnect(&self, event: &DisconnectEvent) {
        let _ = event;
    }
}

/// Shared, growable byte buffer that packet content is appended to.
#[derive(Clone, Default)]
pub struct ContentBuffer(Arc<Mutex<BytesMut>>);

impl ContentBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk of packet content.
    pub fn append(&self, chunk: &[u8]) {
        self.lock().extend_from_slice(chunk);
    }

    /// Take the accumulated bytes, leaving the buffer empty.
    pub fn take(&self) -> Bytes {
        self.lock().split().freeze()
    }

    /// Bytes accumulated since the last `take`.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Why a transport was detached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect` was called locally.
    Requested,
    /// The peer closed the stream.
    Closed,
    /// Reading or writing failed.
    Error(String),
}

impl From<FrameError> for DisconnectReason {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ConnectionClosed => Self::Closed,
            other => Self::Error(other.to_string()),
        }
    }
}

/// Published once per connect/disconnect cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectEvent {
    pub generation: u64,
    pub reason: DisconnectReason,
}

impl DisconnectEvent {
    pub fn is_requested(&self) -> bool {
        self.reason == DisconnectReason::Requested
    }
}

struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<Packet>,
    cancel: CancellationToken,
}

/// Drives the reader and writer tasks of the current transport.
pub struct PacketManager {
    config: PacketConfig,
    handler: Mutex<Option<Weak<dyn PacketHandler>>>,
    link: Mutex<Option<Link>>,
    generation: AtomicU64,
    events: broadcast::Sender<DisconnectEvent>,
}

impl PacketManager {
    pub fn new(config: PacketConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            config,
            handler: Mutex::new(None),
            link: Mutex::new(None),
            generation: AtomicU64::new(0),
            events,
        })
    }

    /// Install the receiver of inbound packets. Held weakly; takes effect on
    /// the next `connect`.
    pub fn set_handler(&self, handler: &Arc<dyn PacketHandler>) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::downgrade(handler));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisconnectEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.lock_link().is_some()
    }

    pub fn config(&self) -> &PacketConfig {
        &self.config
    }

    /// Take ownership of `transport` and start its reader and writer tasks.
    ///
    /// Returns the generation of the new link. Must be called from within a
    /// Tokio runtime.
    pub fn connect(self: &Arc<Self>, transport: IpcTransport) -> Result<u64> {
        let mut link = self.lock_link();
        if link.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let kind = transport.kind();
        let (reader, writer) = transport.into_split();
        let (outbound, queue) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        *link = Some(Link {
            generation,
            outbound,
            cancel: cancel.clone(),
        });
        drop(link);

        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let reader = PacketReader::with_config(reader, self.config.clone());
        tokio::spawn(Arc::clone(self).write_loop(
            generation,
            PacketWriter::new(writer),
            queue,
            cancel.clone(),
        ));
        tokio::spawn(Arc::clone(self).read_loop(generation, reader, handler, cancel));

        info!(generation, kind, "transport attached");
        Ok(generation)
    }

    /// Queue one packet for the writer task. Never blocks.
    pub fn post(&self, packet: Packet) -> Result<()> {
        self.post_all(std::iter::once(packet))
    }

    /// Queue packets back to back, in order.
    pub fn post_all(&self, packets: impl IntoIterator<Item = Packet>) -> Result<()> {
        let link = self.lock_link();
        let Some(link) = link.as_ref() else {
            return Err(ProtocolError::NotConnected);
        };
        for packet in packets {
            link.outbound
                .send(packet)
                .map_err(|_| ProtocolError::NotConnected)?;
        }
        Ok(())
    }

    /// Detach the current transport. Returns `false` if none was attached.
    pub fn disconnect(&self) -> bool {
        self.teardown(None, DisconnectReason::Requested)
    }

    /// Tear down the link if it is still `generation` (any link for `None`).
    fn teardown(&self, generation: Option<u64>, reason: DisconnectReason) -> bool {
        let link = {
            let mut link = self.lock_link();
            let current = link.as_ref().map(|current| current.generation);
            match (current, generation) {
                (Some(current), Some(expected)) if current != expected => None,
                _ => link.take(),
            }
        };
        let Some(link) = link else {
            return false;
        };
        link.cancel.cancel();

        let event = DisconnectEvent {
            generation: link.generation,
            reason,
        };
        info!(generation = event.generation, reason = ?event.reason, "transport detached");
        if let Some(handler) = self.handler() {
            handler.on_disconnect(&event);
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
        true
    }

    async fn write_loop(
        self: Arc<Self>,
        generation: u64,
        mut writer: PacketWriter<BoxedWriter>,
        mut queue: mpsc::UnboundedReceiver<Packet>,
        cancel: CancellationToken,
    ) {
        let failure = loop {
            let packet = tokio::select! {
                biased;
                () = cancel.cancelled() => break None,
                packet = queue.recv() => match packet {
                    Some(packet) => packet,
                    None => break None,
                },
            };
            let written = tokio::select! {
                biased;
                () = cancel.cancelled() => break None,
                written = writer.write_packet(&packet) => written,
            };
            if let Err(err) = written {
                break Some(DisconnectReason::from(err));
            }
        };

        if let Err(err) = writer.shutdown().await {
            debug!(generation, error = %err, "writer shutdown failed");
        }
        if let Some(reason) = failure {
            self.teardown(Some(generation), reason);
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        generation: u64,
        mut reader: PacketReader<BoxedReader>,
        handler: Option<Weak<dyn PacketHandler>>,
        cancel: CancellationToken,
    ) {
        let reason = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            reason = receive(&mut reader, handler) => reason,
        };
        self.teardown(Some(generation), reason);
    }

    fn handler(&self) -> Option<Arc<dyn PacketHandler>> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn receive(
    reader: &mut PacketReader<BoxedReader>,
    handler: Option<Weak<dyn PacketHandler>>,
) -> DisconnectReason {
    loop {
        let header = match reader.read_header().await {
            Ok(header) => header,
            Err(err) => return err.into(),
        };
        let Some(handler) = handler.as_ref().and_then(Weak::upgrade) else {
            debug!(request_id = %header.request_id, "no packet handler; discarding content");
            if let Err(err) = reader.read_content(header.length, |_| {}).await {
                return err.into();
            }
            continue;
        };

        let buffer = handler.content_buffer(&header);
        match reader
            .read_content(header.length, |chunk| buffer.append(chunk))
            .await
        {
            Ok(read) => handler.on_packet(header, &buffer, read),
            Err(err) => return err.into(),
        }
    }
}
