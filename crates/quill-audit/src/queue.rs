//! Bounded in-process event queue.
//!
//! Many producers enqueue; exactly one batcher drains. The lock is held only
//! to push or pop, never across I/O.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::QueueError;
use crate::event::AuditEvent;

struct QueueState {
    events: VecDeque<AuditEvent>,
    closed: bool,
}

/// FIFO buffer between producers and the batcher.
pub struct EventQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    watermark: usize,
    watermark_reached: Notify,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events, without a size
    /// watermark.
    pub fn new(capacity: usize) -> Self {
        Self::with_watermark(capacity, usize::MAX)
    }

    /// Create a queue that signals [`wait_for_watermark`](Self::wait_for_watermark)
    /// whenever an enqueue leaves at least `watermark` events queued.
    pub fn with_watermark(capacity: usize, watermark: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(capacity.min(4096)),
                closed: false,
            }),
            capacity,
            watermark: watermark.max(1),
            watermark_reached: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // No invariant spans a panic inside the critical section
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event; returns the queue depth after the push.
    ///
    /// Fails immediately when the queue is full or closed.
    pub fn enqueue(&self, event: AuditEvent) -> Result<usize, QueueError> {
        let depth = {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.events.len() >= self.capacity {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }
            state.events.push_back(event);
            state.events.len()
        };

        if depth >= self.watermark {
            self.watermark_reached.notify_one();
        }
        Ok(depth)
    }

    /// Remove and return up to `max` events, oldest first.
    pub fn drain_up_to(&self, max: usize) -> Vec<AuditEvent> {
        let mut state = self.lock();
        let take = max.min(state.events.len());
        state.events.drain(..take).collect()
    }

    /// Wait until an enqueue crosses the watermark.
    ///
    /// A crossing that happens while nobody is waiting is remembered, so the
    /// next call returns immediately.
    pub async fn wait_for_watermark(&self) {
        self.watermark_reached.notified().await;
    }

    /// Stop accepting events. Queued events stay drainable.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Operation;
    use std::sync::Arc;
    use std::time::Duration;

    fn event(n: usize) -> AuditEvent {
        AuditEvent::new("tester", "items", Operation::Insert, format!("id={n}"))
    }

    fn keys(events: &[AuditEvent]) -> Vec<String> {
        events.iter().map(|e| e.record_key().to_string()).collect()
    }

    #[test]
    fn test_fifo_drain() {
        let queue = EventQueue::new(10);
        for n in 0..5 {
            queue.enqueue(event(n)).unwrap();
        }

        assert_eq!(keys(&queue.drain_up_to(3)), vec!["id=0", "id=1", "id=2"]);
        assert_eq!(keys(&queue.drain_up_to(10)), vec!["id=3", "id=4"]);
        assert!(queue.drain_up_to(10).is_empty());
    }

    #[test]
    fn test_full_queue_rejects_without_blocking() {
        let queue = EventQueue::new(3);
        for n in 0..3 {
            assert_eq!(queue.enqueue(event(n)).unwrap(), n + 1);
        }

        assert_eq!(
            queue.enqueue(event(3)),
            Err(QueueError::Full { capacity: 3 })
        );
        assert_eq!(queue.len(), 3);

        queue.drain_up_to(1);
        assert!(queue.enqueue(event(4)).is_ok());
    }

    #[test]
    fn test_closed_queue_rejects_but_drains() {
        let queue = EventQueue::new(3);
        queue.enqueue(event(0)).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.enqueue(event(1)), Err(QueueError::Closed));
        assert_eq!(queue.drain_up_to(5).len(), 1);
    }

    #[tokio::test]
    async fn test_watermark_signal_is_remembered() {
        let queue = EventQueue::with_watermark(10, 2);
        queue.enqueue(event(0)).unwrap();
        queue.enqueue(event(1)).unwrap();

        tokio::time::timeout(Duration::from_millis(100), queue.wait_for_watermark())
            .await
            .expect("watermark permit should be stored");
    }

    #[tokio::test]
    async fn test_no_signal_below_watermark() {
        let queue = EventQueue::with_watermark(10, 3);
        queue.enqueue(event(0)).unwrap();

        let waited =
            tokio::time::timeout(Duration::from_millis(20), queue.wait_for_watermark()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_concurrent_producers_keep_per_producer_order() {
        let queue = Arc::new(EventQueue::new(1000));
        let handles: Vec<_> = (0..4)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for n in 0..100 {
                        let key = format!("p={producer};n={n}");
                        queue
                            .enqueue(AuditEvent::new("t", "items", Operation::Insert, key))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let drained = keys(&queue.drain_up_to(1000));
        assert_eq!(drained.len(), 400);
        for producer in 0..4 {
            let prefix = format!("p={producer};");
            let seen: Vec<usize> = drained
                .iter()
                .filter_map(|k| k.strip_prefix(&prefix))
                .map(|n| n.trim_start_matches("n=").parse().unwrap())
                .collect();
            assert_eq!(seen, (0..100).collect::<Vec<_>>());
        }
    }
}
