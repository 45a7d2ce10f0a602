use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::SessionError;

const MAX_BYTES: usize = 16 * 1024 * 1024; // 16MB
const MAX_ITEMS: usize = 500;
const MAX_ITEM_BYTES: usize = 1024 * 1024; // 1MB
const MAX_AGE: Duration = Duration::from_secs(15 * 60); // 15 minutes

/// One buffered send plus the promise its caller is awaiting.
pub struct QueuedSend {
    pub json: String,
    pub ack: oneshot::Sender<Result<(), SessionError>>,
    enqueued_at: Instant,
}

/// FIFO buffer for sends attempted before the connection is server-ready.
///
/// Every entry carries its caller's ack; entries leave the queue either
/// through `drain` (flushed to the transport) or with their ack resolved
/// to an error. Nothing is dropped silently.
pub struct SocketOutbox {
    queue: VecDeque<QueuedSend>,
    total_bytes: usize,
}

impl SocketOutbox {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            total_bytes: 0,
        }
    }

    pub fn enqueue(&mut self, json: String, ack: oneshot::Sender<Result<(), SessionError>>) {
        if json.len() > MAX_ITEM_BYTES {
            tracing::warn!(size = json.len(), "outbound message too large, rejecting");
            let _ = ack.send(Err(SessionError::MessageTooLarge));
            return;
        }

        self.prune_expired();

        if self.queue.len() >= MAX_ITEMS || self.total_bytes + json.len() > MAX_BYTES {
            tracing::warn!(items = self.queue.len(), "outbound queue full, rejecting");
            let _ = ack.send(Err(SessionError::QueueOverflow));
            return;
        }

        self.total_bytes += json.len();
        self.queue.push_back(QueuedSend {
            json,
            ack,
            enqueued_at: Instant::now(),
        });
    }

    /// Take everything in arrival order for flushing.
    pub fn drain(&mut self) -> Vec<QueuedSend> {
        self.prune_expired();
        self.total_bytes = 0;
        self.queue.drain(..).collect()
    }

    /// Reject every buffered entry with the given error.
    pub fn reject_all(&mut self, err: &SessionError) {
        for item in self.queue.drain(..) {
            let _ = item.ack.send(Err(err.clone()));
        }
        self.total_bytes = 0;
    }

    fn prune_expired(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.queue.front() {
            if now.duration_since(front.enqueued_at) > MAX_AGE {
                if let Some(expired) = self.queue.pop_front() {
                    self.total_bytes -= expired.json.len();
                    let _ = expired.ack.send(Err(SessionError::SendTimeout));
                }
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for SocketOutbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> (
        oneshot::Sender<Result<(), SessionError>>,
        oneshot::Receiver<Result<(), SessionError>>,
    ) {
        oneshot::channel()
    }

    #[test]
    fn drain_preserves_fifo_order() {
        let mut outbox = SocketOutbox::new();
        for i in 0..3 {
            let (ack, _rx) = pending();
            outbox.enqueue(format!("m{i}"), ack);
        }
        let order: Vec<String> = outbox.drain().into_iter().map(|q| q.json).collect();
        assert_eq!(order, vec!["m0", "m1", "m2"]);
        assert!(outbox.is_empty());
    }

    #[test]
    fn oversized_item_is_rejected_not_queued() {
        let mut outbox = SocketOutbox::new();
        let (ack, mut rx) = pending();
        outbox.enqueue("x".repeat(MAX_ITEM_BYTES + 1), ack);
        assert_eq!(rx.try_recv().unwrap(), Err(SessionError::MessageTooLarge));
        assert!(outbox.is_empty());
    }

    #[test]
    fn overflow_rejects_new_entry_and_keeps_old() {
        let mut outbox = SocketOutbox::new();
        for i in 0..MAX_ITEMS {
            let (ack, _rx) = pending();
            outbox.enqueue(format!("m{i}"), ack);
        }
        let (ack, mut rx) = pending();
        outbox.enqueue("overflow".into(), ack);
        assert_eq!(rx.try_recv().unwrap(), Err(SessionError::QueueOverflow));
        assert_eq!(outbox.len(), MAX_ITEMS);
        assert_eq!(outbox.drain()[0].json, "m0");
    }

    #[test]
    fn reject_all_resolves_every_ack() {
        let mut outbox = SocketOutbox::new();
        let (ack1, mut rx1) = pending();
        let (ack2, mut rx2) = pending();
        outbox.enqueue("a".into(), ack1);
        outbox.enqueue("b".into(), ack2);

        outbox.reject_all(&SessionError::AuthFailed);

        assert_eq!(rx1.try_recv().unwrap(), Err(SessionError::AuthFailed));
        assert_eq!(rx2.try_recv().unwrap(), Err(SessionError::AuthFailed));
        assert!(outbox.is_empty());
    }
}
