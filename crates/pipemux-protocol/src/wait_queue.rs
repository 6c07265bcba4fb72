use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// FIFO queue with a non-blocking producer side and an async, cancellable
/// consumer side.
///
/// An item enqueued while a consumer is parked is handed to that consumer
/// directly; otherwise it is buffered until the next `dequeue`.
pub struct WaitQueue<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    items: VecDeque<T>,
    waiters: VecDeque<oneshot::Sender<T>>,
}

impl<T> WaitQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Add an item. Never blocks.
    pub fn enqueue(&self, item: T) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut item = item;
        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.send(item) {
                Ok(()) => return,
                // That consumer gave up; try the next one.
                Err(returned) => item = returned,
            }
        }
        inner.items.push_back(item);
    }

    /// Take the next item, waiting until one arrives.
    ///
    /// Returns `None` once `cancel` fires. An item handed over at the moment
    /// of cancellation goes back to the front of the queue.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<T> {
        let mut receiver = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if cancel.is_cancelled() {
                return None;
            }
            let (sender, receiver) = oneshot::channel();
            inner.waiters.push_back(sender);
            receiver
        };

        tokio::select! {
            biased;
            item = &mut receiver => item.ok(),
            () = cancel.cancelled() => {
                receiver.close();
                if let Ok(item) = receiver.try_recv() {
                    self.requeue_front(item);
                }
                None
            }
        }
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn requeue_front(&self, item: T) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.items.push_front(item);
    }
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn enqueue_before_dequeue_buffers() {
        let queue = WaitQueue::new();
        let cancel = CancellationToken::new();
        queue.enqueue(1);
        queue.enqueue(2);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.dequeue(&cancel).await, Some(1));
        assert_eq!(queue.dequeue(&cancel).await, Some(2));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn dequeue_before_enqueue_parks() {
        let queue = Arc::new(WaitQueue::new());
        let cancel = CancellationToken::new();

        let consumer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue("item");

        assert_eq!(consumer.await.unwrap(), Some("item"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn cancellation_wakes_parked_consumer() {
        let queue: Arc<WaitQueue<u32>> = Arc::new(WaitQueue::new());
        let cancel = CancellationToken::new();

        let consumer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(consumer.await.unwrap(), None);
    }

    #[tokio::test]
    async fn item_after_cancelled_consumer_is_buffered() {
        let queue: WaitQueue<u32> = WaitQueue::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(queue.dequeue(&cancel).await, None);

        queue.enqueue(7);
        let fresh = CancellationToken::new();
        assert_eq!(queue.dequeue(&fresh).await, Some(7));
    }

    #[tokio::test]
    async fn buffered_items_win_over_cancellation() {
        let queue = WaitQueue::new();
        let cancel = CancellationToken::new();
        queue.enqueue(5);
        cancel.cancel();
        assert_eq!(queue.dequeue(&cancel).await, Some(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_and_consumers_lose_nothing() {
        let queue = Arc::new(WaitQueue::new());
        let cancel = CancellationToken::new();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let mut got = Vec::new();
                    for _ in 0..250 {
                        got.push(queue.dequeue(&cancel).await.unwrap());
                    }
                    got
                })
            })
            .collect();

        let producers: Vec<_> = (0..4u32)
            .map(|p| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    for i in 0..250u32 {
                        queue.enqueue(p * 1000 + i);
                        if i % 50 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.await.unwrap();
        }
        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort_unstable();
        let mut expected: Vec<u32> = (0..4u32)
            .flat_map(|p| (0..250u32).map(move |i| p * 1000 + i))
            .collect();
        expected.sort_unstable();
        assert_eq!(all, expected);
    }
}
