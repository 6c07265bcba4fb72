//! The multiplexer between messages and packets.
//!
//! Outbound, a [`Request`] or [`Response`] becomes a payload sequence that is
//! shredded and posted. Inbound, packets are grouped by request id into
//! payloads; each request id gets its own task that reassembles the message
//! and routes it to the request handler or the waiting caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use pipemux_frame::{to_packets, PacketHeader, Payload, ProtocolType};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::builder::{MessageBuilder, MessageHeader};
use crate::error::{ProtocolError, Result};
use crate::handler::RequestHandler;
use crate::headers::{RequestHeader, ResponseHeader};
use crate::message::{ReceiveResponse, Request, Response};
use crate::packet_manager::{ContentBuffer, DisconnectEvent, PacketHandler, PacketManager};
use crate::request_manager::RequestManager;
use crate::serializer::{request_payloads, response_payloads};
use crate::wait_queue::WaitQueue;

/// Reassembly state for one inbound request id.
struct ActiveReceive {
    buffer: ContentBuffer,
    /// Type and type header of the payload being filled.
    current: Option<(u8, Option<u8>)>,
    queue: Arc<WaitQueue<Payload>>,
    cancel: CancellationToken,
}

impl ActiveReceive {
    fn new() -> Self {
        Self {
            buffer: ContentBuffer::new(),
            current: None,
            queue: Arc::new(WaitQueue::new()),
            cancel: CancellationToken::new(),
        }
    }
}

/// Turns messages into packets and packets back into messages, one task per
/// inbound request id.
pub struct ProtocolAdapter {
    this: Weak<Self>,
    packets: Arc<PacketManager>,
    requests: RequestManager,
    handler: Option<Arc<dyn RequestHandler>>,
    receives: Mutex<HashMap<Uuid, ActiveReceive>>,
    tasks: TaskTracker,
}

impl ProtocolAdapter {
    /// Create an adapter and install it as the packet handler of `packets`.
    pub fn new(
        packets: Arc<PacketManager>,
        handler: Option<Arc<dyn RequestHandler>>,
    ) -> Arc<Self> {
        let adapter = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            packets,
            requests: RequestManager::new(),
            handler,
            receives: Mutex::new(HashMap::new()),
            tasks: TaskTracker::new(),
        });
        let as_handler: Arc<dyn PacketHandler> = adapter.clone();
        adapter.packets.set_handler(&as_handler);
        adapter
    }

    /// Send a request and wait for its response.
    pub async fn send_request(&self, request: &Request) -> Result<ReceiveResponse> {
        let request_id = Uuid::new_v4();
        let pending = self.requests.await_response(request_id)?;
        let payloads = request_payloads(request_id, request)?;
        self.post_payloads(&payloads)?;
        debug!(
            %request_id,
            method = %request.method,
            path = %request.path,
            feeds = request.feeds.len(),
            "request sent"
        );
        pending.await
    }

    /// Send `response` under the id of the request it answers.
    pub fn send_response(&self, request_id: Uuid, response: &Response) -> Result<()> {
        let payloads = response_payloads(request_id, response)?;
        self.post_payloads(&payloads)?;
        debug!(%request_id, status = response.status, "response sent");
        Ok(())
    }

    pub fn requests(&self) -> &RequestManager {
        &self.requests
    }

    /// Number of request ids currently being reassembled.
    pub fn active_receives(&self) -> usize {
        self.lock_receives().len()
    }

    /// Drop all reassembly state and stop its tasks. Returns how many
    /// receives were in flight.
    pub fn reset(&self) -> usize {
        let drained: Vec<ActiveReceive> = self.lock_receives().drain().map(|(_, a)| a).collect();
        for active in &drained {
            active.cancel.cancel();
        }
        drained.len()
    }

    /// Wait until every request task has finished. Closes the tracker.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    fn post_payloads(&self, payloads: &[Payload]) -> Result<()> {
        self.packets.post_all(payloads.iter().flat_map(to_packets))
    }

    fn spawn_receive(&self, request_id: Uuid, queue: Arc<WaitQueue<Payload>>, cancel: CancellationToken) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        self.tasks.spawn(async move {
            let task = tokio::spawn(Arc::clone(&this).process(request_id, Arc::clone(&queue), cancel));
            if let Err(err) = task.await {
                if err.is_panic() {
                    error!(%request_id, "request task panicked");
                }
            }
            this.finish_receive(request_id, &queue);
        });
    }

    async fn process(
        self: Arc<Self>,
        request_id: Uuid,
        queue: Arc<WaitQueue<Payload>>,
        cancel: CancellationToken,
    ) {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ProtocolError::Cancelled),
            outcome = self.exchange(request_id, &queue, &cancel) => outcome,
        };
        match outcome {
            Ok(()) => {}
            Err(ProtocolError::Cancelled) => debug!(%request_id, "receive cancelled"),
            Err(err) => warn!(%request_id, error = %err, "inbound exchange dropped"),
        }
    }

    async fn exchange(
        &self,
        request_id: Uuid,
        queue: &WaitQueue<Payload>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let first = next_payload(queue, cancel).await?;
        match first.protocol_type() {
            Ok(ProtocolType::Request) => {
                let request = assemble::<RequestHeader>(first, queue, cancel).await?;
                debug!(
                    %request_id,
                    method = %request.method,
                    path = %request.path,
                    "request received"
                );
                let Some(handler) = &self.handler else {
                    warn!(%request_id, "no request handler installed; request dropped");
                    return Ok(());
                };
                if let Some(response) = handler.process_request(request).await {
                    self.send_response(request_id, &response)?;
                }
                Ok(())
            }
            Ok(ProtocolType::Response) => {
                let response = match assemble::<ResponseHeader>(first, queue, cancel).await {
                    Ok(response) => response,
                    Err(err) => return Err(self.abandon(request_id, err)),
                };
                let status = response.status;
                if !self.requests.signal(request_id, response) {
                    debug!(%request_id, status, "unmatched response dropped");
                }
                Ok(())
            }
            Ok(kind @ (ProtocolType::ContentStream | ProtocolType::Cancel)) => {
                Err(self.abandon(request_id, ProtocolError::Unsupported(kind)))
            }
            Ok(kind) => Err(self.abandon(
                request_id,
                ProtocolError::Violation(format!("{} payload cannot open an exchange", kind.name())),
            )),
            Err(tag) => Err(self.abandon(
                request_id,
                ProtocolError::Violation(format!("unknown payload type {tag}")),
            )),
        }
    }

    /// Settle the local waiter for `request_id`, if any, after its exchange
    /// broke. Hands `err` back for the caller to return.
    fn abandon(&self, request_id: Uuid, err: ProtocolError) -> ProtocolError {
        if self.requests.cancel(request_id) {
            debug!(%request_id, error = %err, "waiter cancelled by a broken response");
        }
        err
    }

    fn finish_receive(&self, request_id: Uuid, queue: &Arc<WaitQueue<Payload>>) {
        let mut receives = self.lock_receives();
        if receives
            .get(&request_id)
            .is_some_and(|active| Arc::ptr_eq(&active.queue, queue))
        {
            receives.remove(&request_id);
        }
    }

    fn lock_receives(&self) -> MutexGuard<'_, HashMap<Uuid, ActiveReceive>> {
        self.receives.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PacketHandler for ProtocolAdapter {
    fn content_buffer(&self, header: &PacketHeader) -> ContentBuffer {
        let mut receives = self.lock_receives();
        if let Some(active) = receives.get(&header.request_id) {
            return active.buffer.clone();
        }

        let active = ActiveReceive::new();
        let buffer = active.buffer.clone();
        let queue = Arc::clone(&active.queue);
        let cancel = active.cancel.clone();
        receives.insert(header.request_id, active);
        drop(receives);

        debug!(request_id = %header.request_id, "receive started");
        self.spawn_receive(header.request_id, queue, cancel);
        buffer
    }

    fn on_packet(&self, header: PacketHeader, buffer: &ContentBuffer, bytes_read: usize) {
        let request_id = header.request_id;
        let mut receives = self.lock_receives();
        let Some(active) = receives.get_mut(&request_id) else {
            debug!(%request_id, bytes_read, "packet for a finished receive dropped");
            return;
        };

        let key = (header.payload_type, header.type_header);
        if active.current.is_some_and(|current| current != key) {
            warn!(
                %request_id,
                payload_type = header.payload_type,
                "payload type changed mid-payload; dropping exchange"
            );
            if let Some(active) = receives.remove(&request_id) {
                active.cancel.cancel();
            }
            drop(receives);
            self.requests.cancel(request_id);
            return;
        }
        active.current = Some(key);

        if header.is_end {
            active.current = None;
            let content = buffer.take();
            active.queue.enqueue(Payload {
                payload_type: header.payload_type,
                type_header: header.type_header,
                request_id,
                content,
            });
        }
    }

    fn on_disconnect(&self, event: &DisconnectEvent) {
        let receives = self.reset();
        let waiters = self.requests.cancel_all();
        debug!(
            generation = event.generation,
            receives,
            waiters,
            "cleared exchange state"
        );
    }
}

async fn next_payload(queue: &WaitQueue<Payload>, cancel: &CancellationToken) -> Result<Payload> {
    queue.dequeue(cancel).await.ok_or(ProtocolError::Cancelled)
}

async fn assemble<H: MessageHeader>(
    first: Payload,
    queue: &WaitQueue<Payload>,
    cancel: &CancellationToken,
) -> Result<H::Message> {
    let mut builder = MessageBuilder::<H>::new();
    let mut payload = first;
    loop {
        if let Some(message) = builder.push(payload)? {
            return Ok(message);
        }
        payload = next_payload(queue, cancel).await?;
    }
}
