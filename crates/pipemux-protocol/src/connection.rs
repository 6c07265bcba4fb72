use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pipemux_frame::PacketConfig;
use pipemux_transport::IpcTransport;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::ProtocolAdapter;
use crate::error::{ProtocolError, Result};
use crate::handler::RequestHandler;
use crate::message::{ReceiveResponse, Request};
use crate::packet_manager::{DisconnectEvent, PacketManager};
use crate::source::TransportSource;

/// What to do after the transport drops without `disconnect` being called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reopen the transport source automatically. Default: false.
    pub enabled: bool,
    /// Pause before each attempt. Default: 1s.
    pub delay: Duration,
    /// Give up after this many failed attempts. Default: unlimited.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Reconnect forever with `delay` between attempts.
    pub fn every(delay: Duration) -> Self {
        Self {
            enabled: true,
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    pub packet: PacketConfig,
    pub reconnect: ReconnectPolicy,
}

/// Builder for [`Connection`].
#[derive(Default)]
pub struct ConnectionBuilder {
    source: Option<Arc<dyn TransportSource>>,
    handler: Option<Arc<dyn RequestHandler>>,
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Where `connect` and reconnects get transports from.
    pub fn source(mut self, source: impl TransportSource) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Handler for requests sent by the peer.
    pub fn handler(mut self, handler: impl RequestHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Build the connection. Nothing is opened until `connect` or `attach`.
    ///
    /// With reconnect enabled this spawns a supervisor task and must be
    /// called from within a Tokio runtime.
    pub fn build(self) -> Connection {
        let packets = PacketManager::new(self.config.packet.clone());
        let adapter = ProtocolAdapter::new(Arc::clone(&packets), self.handler);
        let shared = Arc::new(Shared {
            packets,
            adapter,
            source: self.source,
            policy: self.config.reconnect,
            detached: AtomicBool::new(true),
            lifecycle: Mutex::new(()),
            stop: CancellationToken::new(),
        });

        if shared.policy.enabled && shared.source.is_some() {
            let events = shared.packets.subscribe();
            tokio::spawn(Arc::clone(&shared).supervise(events));
        }

        Connection { shared }
    }
}

struct Shared {
    packets: Arc<PacketManager>,
    adapter: Arc<ProtocolAdapter>,
    source: Option<Arc<dyn TransportSource>>,
    policy: ReconnectPolicy,
    /// Set by `disconnect`, cleared by `connect`/`attach`; suppresses
    /// reconnects.
    detached: AtomicBool,
    /// Serializes attaching against `detach` so a reconnect in flight cannot
    /// revive a connection that was disconnected meanwhile.
    lifecycle: Mutex<()>,
    stop: CancellationToken,
}

impl Shared {
    fn attach(&self, transport: IpcTransport) -> Result<u64> {
        let _lifecycle = self.lock_lifecycle();
        let generation = self.packets.connect(transport)?;
        self.detached.store(false, Ordering::SeqCst);
        Ok(generation)
    }

    /// Attach a reopened transport unless `detach` ran since the link was
    /// lost. Returns `None` and drops `transport` in that case.
    fn reattach(&self, transport: IpcTransport) -> Result<Option<u64>> {
        let _lifecycle = self.lock_lifecycle();
        if self.detached.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.packets.connect(transport).map(Some)
    }

    fn detach(&self) -> bool {
        let _lifecycle = self.lock_lifecycle();
        self.detached.store(true, Ordering::SeqCst);
        self.packets.disconnect()
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn supervise(self: Arc<Self>, mut events: broadcast::Receiver<DisconnectEvent>) {
        loop {
            let event = tokio::select! {
                biased;
                () = self.stop.cancelled() => return,
                event = events.recv() => event,
            };
            match event {
                Ok(event) if event.is_requested() => {}
                Ok(event) => {
                    debug!(generation = event.generation, reason = ?event.reason, "transport lost");
                    self.reconnect().await;
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "disconnect events lagged"),
                Err(RecvError::Closed) => return,
            }
        }
    }

    async fn reconnect(&self) {
        let Some(source) = self.source.as_deref() else {
            return;
        };
        let mut attempt = 0u32;
        loop {
            if self.policy.max_attempts.is_some_and(|max| attempt >= max) {
                warn!(attempts = attempt, "reconnect attempts exhausted");
                return;
            }
            attempt += 1;

            tokio::select! {
                biased;
                () = self.stop.cancelled() => return,
                () = tokio::time::sleep(self.policy.delay) => {}
            }
            if self.detached.load(Ordering::SeqCst) {
                debug!("disconnected locally; reconnect abandoned");
                return;
            }

            let opened = tokio::select! {
                biased;
                () = self.stop.cancelled() => return,
                opened = source.open() => opened,
            };
            let attached = opened
                .map_err(ProtocolError::from)
                .and_then(|transport| self.reattach(transport));
            match attached {
                Ok(Some(generation)) => {
                    info!(attempt, generation, "reconnected");
                    return;
                }
                Ok(None) => {
                    debug!("disconnected locally while reopening; transport dropped");
                    return;
                }
                Err(ProtocolError::AlreadyConnected) => return,
                Err(err) => warn!(attempt, error = %err, "reconnect failed"),
            }
        }
    }
}

/// A request/response connection over one transport at a time.
///
/// Client and server differ only in the [`TransportSource`]: a client
/// connects to a pipe pair, a server accepts on one. Either side may send
/// requests and answer them. Dropping the connection disconnects it.
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// Open a transport from the configured source and attach it.
    pub async fn connect(&self) -> Result<()> {
        let source = self
            .shared
            .source
            .as_deref()
            .ok_or(ProtocolError::NoTransportSource)?;
        if self.shared.packets.is_connected() {
            return Err(ProtocolError::AlreadyConnected);
        }
        let transport = source.open().await?;
        self.shared.attach(transport)?;
        Ok(())
    }

    /// Attach an already open transport.
    pub fn attach(&self, transport: IpcTransport) -> Result<()> {
        self.shared.attach(transport).map(drop)
    }

    /// Send `request` and wait for the peer's response.
    ///
    /// Fails with [`ProtocolError::Cancelled`] if the transport drops first.
    pub async fn send_request(&self, request: &Request) -> Result<ReceiveResponse> {
        self.shared.adapter.send_request(request).await
    }

    /// [`send_request`](Self::send_request) bounded by `timeout`.
    pub async fn send_request_timeout(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<ReceiveResponse> {
        tokio::time::timeout(timeout, self.send_request(request))
            .await
            .map_err(|_| ProtocolError::Timeout(timeout))?
    }

    /// Detach the transport, cancel pending requests and suppress
    /// reconnects until the next `connect`/`attach`.
    pub fn disconnect(&self) -> bool {
        self.shared.detach()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.packets.is_connected()
    }

    /// Disconnect notifications, one per detached transport.
    pub fn subscribe(&self) -> broadcast::Receiver<DisconnectEvent> {
        self.shared.packets.subscribe()
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.adapter.requests().pending()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.stop.cancel();
        self.shared.detach();
    }
}
