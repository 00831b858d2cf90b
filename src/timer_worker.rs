//! Timer Worker: holds a min-heap of deferred items and releases each
//! when its deadline passes, adapting its poll interval to the next
//! deadline so it wakes promptly without busy-waiting.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::item::TimerItem;
use crate::worker::{Envelope, ItemHandler};

struct PendingTimer {
    ready_time: Instant,
    seq: u64,
    envelope: Envelope<TimerItem>,
}

impl PartialEq for PendingTimer {
    fn eq(&self, other: &Self) -> bool {
        self.ready_time == other.ready_time && self.seq == other.seq
    }
}
impl Eq for PendingTimer {}

impl PartialOrd for PendingTimer {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingTimer {
    // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap by
    // ready_time, with insertion order breaking ties.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .ready_time
            .cmp(&self.ready_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Queues `TimerItem`s until their deadline passes, then resolves them.
/// The heap and the adaptive poll-interval state are private to this
/// worker; no other component reaches into it.
pub struct TimerWorker {
    heap: Mutex<BinaryHeap<PendingTimer>>,
    next_seq: AtomicU64,
    default_poll_interval: Duration,
    next_wake: Mutex<Duration>,
}

impl TimerWorker {
    pub fn new(default_poll_interval: Duration) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
            next_wake: Mutex::new(default_poll_interval),
            default_poll_interval,
        }
    }

    /// Pops and resolves every item whose deadline has passed, then
    /// recomputes how long to wait before the next check.
    fn release_due(&self) -> Vec<PendingTimer> {
        let now = Instant::now();
        let mut heap = self.heap.lock().expect("timer heap poisoned");

        let mut due = Vec::new();
        while matches!(heap.peek(), Some(top) if top.ready_time <= now) {
            due.push(heap.pop().expect("peeked Some"));
        }

        let next_wake = match heap.peek() {
            Some(top) => top.ready_time.saturating_duration_since(now),
            None => self.default_poll_interval,
        };
        *self.next_wake.lock().expect("next_wake poisoned") = if next_wake.is_zero() {
            self.default_poll_interval.min(Duration::from_millis(1))
        } else {
            next_wake
        };

        due
    }
}

#[async_trait]
impl ItemHandler<TimerItem> for TimerWorker {
    async fn handle(&self, envelope: Envelope<TimerItem>) {
        let ready_time = envelope.item.ready_time;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        {
            let mut heap = self.heap.lock().expect("timer heap poisoned");
            heap.push(PendingTimer {
                ready_time,
                seq,
                envelope,
            });
        }
        for due in self.release_due() {
            debug!(item = %due.envelope.item.id, "releasing due timer");
            let _ = due.envelope.reply.send(due.envelope.item);
        }
    }

    async fn handle_nothing(&self) {
        for due in self.release_due() {
            debug!(item = %due.envelope.item.id, "releasing due timer");
            let _ = due.envelope.reply.send(due.envelope.item);
        }
    }

    fn poll_interval(&self) -> Duration {
        *self.next_wake.lock().expect("next_wake poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn item_resolves_only_after_deadline() {
        let worker = TimerWorker::new(Duration::from_millis(50));
        let item = TimerItem::after(Duration::from_millis(100));
        let (tx, rx) = oneshot::channel();
        let before = Instant::now();
        worker.handle(Envelope { item, reply: tx }).await;

        // Not due yet: release_due() at submission time shouldn't resolve it.
        assert!(rx.try_recv().is_err());

        // Poll interval adapts to the remaining time until the deadline.
        let adapted = worker.poll_interval();
        assert!(adapted <= Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(120)).await;
        worker.handle_nothing().await;
        let completed = rx.await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(100));
        assert!(completed.error.is_none());
    }

    #[tokio::test]
    async fn reverts_to_default_poll_interval_when_idle() {
        let worker = TimerWorker::new(Duration::from_secs(1));
        assert_eq!(worker.poll_interval(), Duration::from_secs(1));
        let item = TimerItem::after(Duration::from_millis(10));
        let (tx, _rx) = oneshot::channel();
        worker.handle(Envelope { item, reply: tx }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.handle_nothing().await;
        assert_eq!(worker.poll_interval(), Duration::from_secs(1));
    }
}
