//! FIFO queue of pending acquire requests.
//!
//! Requests resolve strictly in arrival order as the reconciliation pass
//! frees capacity. The queue also keeps the pool's acquisition-latency
//! statistics; every completed wait is recorded, whether the request was
//! resolved with a resource or cancelled by its deadline.

use crate::events::{EventSink, PoolEvent};
use crate::resource::Pooled;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Identifier of a queued acquire request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RequestId(u64);

/// One pending acquire request.
struct AcquireRequest<L> {
    id: RequestId,
    enqueued_at: Instant,
    metadata: serde_json::Value,
    sender: oneshot::Sender<Pooled<L>>,
}

/// Aggregate acquisition-latency statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    /// Longest observed wait.
    pub max_wait: Duration,
    /// Mean wait over all completed acquisitions. Zero when nothing has
    /// completed yet.
    pub mean_wait: Duration,
}

#[derive(Debug, Default)]
struct LatencyStats {
    max: Duration,
    total: Duration,
    samples: u64,
}

impl LatencyStats {
    fn record(&mut self, elapsed: Duration) {
        self.max = self.max.max(elapsed);
        self.total += elapsed;
        self.samples += 1;
    }

    fn report(&self) -> QueueStats {
        QueueStats {
            max_wait: self.max,
            mean_wait: if self.samples == 0 {
                Duration::ZERO
            } else {
                self.total.div_f64(self.samples as f64)
            },
        }
    }
}

/// What happened when the queue head was offered a resource.
pub(crate) enum ResolveOutcome<L> {
    /// The oldest request accepted the resource.
    Delivered,
    /// The queue was empty; the resource comes back to the caller.
    NoWaiter(Pooled<L>),
    /// The oldest request's receiver was dropped before delivery; the
    /// resource comes back so it can be routed to teardown.
    Disconnected(Pooled<L>),
}

/// Ordered queue of pending acquire requests.
pub(crate) struct AcquireQueue<L> {
    requests: VecDeque<AcquireRequest<L>>,
    next_id: u64,
    stats: LatencyStats,
}

impl<L> AcquireQueue<L> {
    pub(crate) fn new() -> Self {
        Self {
            requests: VecDeque::new(),
            next_id: 0,
            stats: LatencyStats::default(),
        }
    }

    /// Append a request. The deadline is composed by the caller; on expiry
    /// it must call [`cancel`](Self::cancel) with the returned id.
    pub(crate) fn enqueue(
        &mut self,
        metadata: serde_json::Value,
        sender: oneshot::Sender<Pooled<L>>,
    ) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.requests.push_back(AcquireRequest {
            id,
            enqueued_at: Instant::now(),
            metadata,
            sender,
        });
        id
    }

    /// Remove a timed-out request.
    ///
    /// Returns `false` if the request is no longer queued, meaning a
    /// reconciliation pass resolved it before the cancel took the lock; the
    /// caller should then take the delivered resource instead of failing.
    /// The elapsed wait is recorded even on timeout.
    pub(crate) fn cancel(&mut self, id: RequestId) -> bool {
        let Some(index) = self.requests.iter().position(|r| r.id == id) else {
            return false;
        };
        let request = self.requests.remove(index).expect("position was valid");
        self.stats.record(request.enqueued_at.elapsed());
        log::debug!("acquire request {} timed out and left the queue", id.0);
        true
    }

    /// Pop the head of the queue and fulfill it with `pooled`, emitting an
    /// after-acquire notification on delivery.
    pub(crate) fn resolve_oldest(
        &mut self,
        pooled: Pooled<L>,
        sink: &EventSink<L>,
    ) -> ResolveOutcome<L> {
        let Some(request) = self.requests.pop_front() else {
            return ResolveOutcome::NoWaiter(pooled);
        };
        self.stats.record(request.enqueued_at.elapsed());

        let resource = std::sync::Arc::clone(pooled.resource());
        match request.sender.send(pooled) {
            Ok(()) => {
                sink.emit(&PoolEvent::AfterAcquire {
                    resource,
                    metadata: request.metadata,
                });
                ResolveOutcome::Delivered
            }
            Err(pooled) => {
                log::debug!("acquire request {} abandoned before delivery", request.id.0);
                ResolveOutcome::Disconnected(pooled)
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn stats(&self) -> QueueStats {
        self.stats.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceId;
    use std::sync::Arc;

    struct TestLight;

    fn pooled() -> Pooled<TestLight> {
        Pooled::new(ResourceId::new(), Arc::new(TestLight))
    }

    #[test]
    fn stats_mean_is_zero_without_samples() {
        let queue: AcquireQueue<TestLight> = AcquireQueue::new();
        let stats = queue.stats();
        assert_eq!(stats.mean_wait, Duration::ZERO);
        assert_eq!(stats.max_wait, Duration::ZERO);
    }

    #[test]
    fn resolve_on_empty_queue_returns_the_resource() {
        let mut queue: AcquireQueue<TestLight> = AcquireQueue::new();
        let sink = EventSink::new();
        match queue.resolve_oldest(pooled(), &sink) {
            ResolveOutcome::NoWaiter(_) => {}
            _ => panic!("expected NoWaiter"),
        }
    }

    #[test]
    fn requests_resolve_in_arrival_order() {
        let mut queue: AcquireQueue<TestLight> = AcquireQueue::new();
        let sink = EventSink::new();

        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        queue.enqueue(serde_json::Value::Null, tx1);
        queue.enqueue(serde_json::Value::Null, tx2);

        assert!(matches!(
            queue.resolve_oldest(pooled(), &sink),
            ResolveOutcome::Delivered
        ));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());

        assert!(matches!(
            queue.resolve_oldest(pooled(), &sink),
            ResolveOutcome::Delivered
        ));
        assert!(rx2.try_recv().is_ok());
        assert!(queue.is_empty());
    }

    #[test]
    fn cancel_removes_the_request_and_records_the_wait() {
        let mut queue: AcquireQueue<TestLight> = AcquireQueue::new();

        let (tx, _rx) = oneshot::channel();
        let id = queue.enqueue(serde_json::Value::Null, tx);
        assert_eq!(queue.len(), 1);

        assert!(queue.cancel(id));
        assert!(queue.is_empty());
        assert_eq!(queue.stats().max_wait, queue.stats().mean_wait);

        // A second cancel finds nothing.
        assert!(!queue.cancel(id));
    }

    #[test]
    fn dropped_receiver_hands_the_resource_back() {
        let mut queue: AcquireQueue<TestLight> = AcquireQueue::new();
        let sink = EventSink::new();

        let (tx, rx) = oneshot::channel();
        queue.enqueue(serde_json::Value::Null, tx);
        drop(rx);

        match queue.resolve_oldest(pooled(), &sink) {
            ResolveOutcome::Disconnected(_) => {}
            _ => panic!("expected Disconnected"),
        }
    }
}
