use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{ProtocolError, Result};
use crate::message::ReceiveResponse;

struct Waiter {
    ticket: u64,
    sender: oneshot::Sender<ReceiveResponse>,
}

#[derive(Default)]
struct Waiters {
    next_ticket: AtomicU64,
    by_id: Mutex<HashMap<Uuid, Waiter>>,
}

impl Waiters {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Waiter>> {
        self.by_id.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Correlates outbound request ids with the tasks awaiting their responses.
///
/// Cloning yields another handle to the same waiter table.
#[derive(Clone, Default)]
pub struct RequestManager {
    waiters: Arc<Waiters>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `request_id`.
    ///
    /// Fails with [`ProtocolError::DuplicateRequestId`] if one is already
    /// pending. Dropping the returned future removes the waiter.
    pub fn await_response(&self, request_id: Uuid) -> Result<PendingResponse> {
        let mut by_id = self.waiters.lock();
        let Entry::Vacant(slot) = by_id.entry(request_id) else {
            return Err(ProtocolError::DuplicateRequestId(request_id));
        };
        let ticket = self.waiters.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        slot.insert(Waiter { ticket, sender });
        Ok(PendingResponse {
            request_id,
            ticket,
            receiver,
            waiters: Arc::clone(&self.waiters),
        })
    }

    /// Resolve the waiter for `request_id`.
    ///
    /// Returns `false` when nobody is waiting; the response is dropped.
    pub fn signal(&self, request_id: Uuid, response: ReceiveResponse) -> bool {
        let waiter = self.waiters.lock().remove(&request_id);
        match waiter {
            Some(waiter) => waiter.sender.send(response).is_ok(),
            None => false,
        }
    }

    /// Settle one waiter as cancelled.
    pub fn cancel(&self, request_id: Uuid) -> bool {
        self.waiters.lock().remove(&request_id).is_some()
    }

    /// Settle every waiter as cancelled. Returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Waiter> = self.waiters.lock().drain().map(|(_, w)| w).collect();
        drained.len()
    }

    /// Number of pending waiters.
    pub fn pending(&self) -> usize {
        self.waiters.lock().len()
    }
}

/// Resolves to the response for one request id, or
/// [`ProtocolError::Cancelled`] if the waiter is cancelled.
pub struct PendingResponse {
    request_id: Uuid,
    ticket: u64,
    receiver: oneshot::Receiver<ReceiveResponse>,
    waiters: Arc<Waiters>,
}

impl PendingResponse {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

impl Future for PendingResponse {
    type Output = Result<ReceiveResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| ProtocolError::Cancelled))
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        let mut by_id = self.waiters.lock();
        if by_id
            .get(&self.request_id)
            .is_some_and(|waiter| waiter.ticket == self.ticket)
        {
            by_id.remove(&self.request_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Headers;

    fn response(status: u16) -> ReceiveResponse {
        ReceiveResponse {
            status,
            headers: Headers::new(),
            feeds: Vec::new(),
        }
    }

    #[tokio::test]
    async fn signal_resolves_matching_waiter_only() {
        let manager = RequestManager::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let pending_first = manager.await_response(first).unwrap();
        let pending_second = manager.await_response(second).unwrap();

        assert!(manager.signal(second, response(201)));
        assert_eq!(pending_second.await.unwrap().status, 201);
        assert_eq!(manager.pending(), 1);

        assert!(manager.signal(first, response(200)));
        assert_eq!(pending_first.await.unwrap().status, 200);
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn duplicate_request_id_is_rejected() {
        let manager = RequestManager::new();
        let id = Uuid::new_v4();
        let _pending = manager.await_response(id).unwrap();
        let err = manager.await_response(id).err().unwrap();
        assert!(matches!(err, ProtocolError::DuplicateRequestId(dup) if dup == id));
        assert_eq!(manager.pending(), 1);
    }

    #[test]
    fn unknown_id_signal_is_a_no_op() {
        let manager = RequestManager::new();
        let id = Uuid::new_v4();
        let _pending = manager.await_response(id).unwrap();

        assert!(!manager.signal(Uuid::new_v4(), response(200)));
        assert_eq!(manager.pending(), 1);
    }

    #[tokio::test]
    async fn cancel_all_settles_every_waiter() {
        let manager = RequestManager::new();
        let pending: Vec<_> = (0..5)
            .map(|_| manager.await_response(Uuid::new_v4()).unwrap())
            .collect();

        assert_eq!(manager.cancel_all(), 5);
        for waiter in pending {
            assert!(matches!(waiter.await, Err(ProtocolError::Cancelled)));
        }
    }

    #[tokio::test]
    async fn cancel_settles_one_waiter() {
        let manager = RequestManager::new();
        let keep = Uuid::new_v4();
        let drop_id = Uuid::new_v4();
        let _kept = manager.await_response(keep).unwrap();
        let cancelled = manager.await_response(drop_id).unwrap();

        assert!(manager.cancel(drop_id));
        assert!(matches!(cancelled.await, Err(ProtocolError::Cancelled)));
        assert_eq!(manager.pending(), 1);
    }

    #[test]
    fn dropping_pending_response_removes_waiter() {
        let manager = RequestManager::new();
        let id = Uuid::new_v4();
        let pending = manager.await_response(id).unwrap();
        assert_eq!(pending.request_id(), id);
        drop(pending);
        assert_eq!(manager.pending(), 0);
        assert!(!manager.signal(id, response(200)));
    }

    #[test]
    fn stale_pending_drop_keeps_newer_waiter() {
        let manager = RequestManager::new();
        let id = Uuid::new_v4();
        let stale = manager.await_response(id).unwrap();
        assert!(manager.cancel(id));
        let _fresh = manager.await_response(id).unwrap();

        drop(stale);
        assert_eq!(manager.pending(), 1);
    }
}
