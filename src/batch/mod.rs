//! Priority-queued batch coalescer (spec §4.6).
//!
//! Individual requests for the same `(endpoint, timeframe)` pair are
//! coalesced into a single provider call once a batch fills or its timeout
//! elapses. Grounded on `OHLCVBatcher`: the same five priority levels with
//! the same ordering, `BatchRequest`/`BatchResult` shape, and `[1, 2, 4]`
//! retry delays, rewired onto `std::collections::BinaryHeap` and
//! `tokio::sync::oneshot` per request instead of Python futures.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Critical = 1,
    High = 2,
    Normal = 3,
    Low = 4,
    BatchOnly = 5,
}

pub type BatchItem = String;

struct QueuedRequest {
    item: BatchItem,
    endpoint: String,
    timeframe: String,
    priority: Priority,
    enqueued_at: Instant,
    reply: oneshot::Sender<Result<serde_json::Value, ProviderError>>,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.enqueued_at == other.enqueued_at
    }
}
impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    /// `BinaryHeap` is a max-heap; lower `Priority` values (Critical=1) must
    /// sort as "greatest" so they're popped first, and earlier arrivals
    /// break ties — invert both comparisons accordingly.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    pub batch_timeout: Duration,
    pub priority_batch_size: usize,
    pub retry_delays: Vec<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            batch_timeout: Duration::from_secs(2),
            priority_batch_size: 5,
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchStats {
    pub total_requests: u64,
    pub batched_requests: u64,
    pub priority_requests: u64,
    pub failed_requests: u64,
    pub batches_flushed: u64,
}

/// A batch ready to be executed against a provider.
pub struct Batch {
    pub endpoint: String,
    pub timeframe: String,
    pub items: Vec<BatchItem>,
    replies: Vec<oneshot::Sender<Result<serde_json::Value, ProviderError>>>,
}

impl Batch {
    /// Delivers `results[i]` to the i-th request's waiter. `results` must be
    /// the same length as `items`; a short result vector leaves the
    /// remaining waiters un-notified, which resolves their `get_result` call
    /// as a dropped-sender error.
    pub fn complete(self, mut results: Vec<Result<serde_json::Value, ProviderError>>) {
        for reply in self.replies {
            let result = if results.is_empty() {
                Err(ProviderError::BadResponse("missing batch result".into()))
            } else {
                results.remove(0)
            };
            let _ = reply.send(result);
        }
    }
}

struct Inner {
    priority_queue: BinaryHeap<QueuedRequest>,
    timeframe_queues: HashMap<(String, String), VecDeque<QueuedRequest>>,
    stats: BatchStats,
    current_batch_size: usize,
}

/// Coalesces individual fetch requests into provider-level batch calls.
pub struct BatchCoalescer {
    config: BatchConfig,
    inner: Mutex<Inner>,
}

impl BatchCoalescer {
    pub fn new(config: BatchConfig) -> Self {
        let current_batch_size = config.max_batch_size;
        Self {
            config,
            inner: Mutex::new(Inner {
                priority_queue: BinaryHeap::new(),
                timeframe_queues: HashMap::new(),
                stats: BatchStats::default(),
                current_batch_size,
            }),
        }
    }

    /// Enqueues one request; CRITICAL/HIGH priority requests jump the
    /// per-`(endpoint, timeframe)` FIFO and are drained first by `drain_batch`.
    pub fn enqueue(
        &self,
        item: BatchItem,
        endpoint: impl Into<String>,
        timeframe: impl Into<String>,
        priority: Priority,
    ) -> oneshot::Receiver<Result<serde_json::Value, ProviderError>> {
        let (tx, rx) = oneshot::channel();
        let request = QueuedRequest {
            item,
            endpoint: endpoint.into(),
            timeframe: timeframe.into(),
            priority,
            enqueued_at: Instant::now(),
            reply: tx,
        };

        let mut inner = self.inner.lock();
        inner.stats.total_requests += 1;

        if matches!(priority, Priority::Critical | Priority::High) {
            inner.stats.priority_requests += 1;
            inner.priority_queue.push(request);
        } else {
            let key = (request.endpoint.clone(), request.timeframe.clone());
            inner.timeframe_queues.entry(key).or_default().push_back(request);
        }

        rx
    }

    /// Pulls up to `current_batch_size` requests for one `(endpoint,
    /// timeframe)` group, preferring the priority queue first. Returns
    /// `None` if nothing is queued.
    pub fn drain_batch(&self) -> Option<Batch> {
        let mut inner = self.inner.lock();
        let batch_size = inner.current_batch_size.max(1);

        if !inner.priority_queue.is_empty() {
            let mut drained = Vec::new();
            let take = self.config.priority_batch_size.min(batch_size);
            while drained.len() < take {
                match inner.priority_queue.pop() {
                    Some(req) => drained.push(req),
                    None => break,
                }
            }
            if !drained.is_empty() {
                return Some(Self::assemble(&mut inner, drained));
            }
        }

        let key = inner
            .timeframe_queues
            .iter()
            .find(|(_, q)| !q.is_empty())
            .map(|(k, _)| k.clone())?;

        let queue = inner.timeframe_queues.get_mut(&key)?;
        let mut drained = Vec::new();
        while drained.len() < batch_size {
            match queue.pop_front() {
                Some(req) => drained.push(req),
                None => break,
            }
        }
        if queue.is_empty() {
            inner.timeframe_queues.remove(&key);
        }

        Some(Self::assemble(&mut inner, drained))
    }

    fn assemble(inner: &mut Inner, drained: Vec<QueuedRequest>) -> Batch {
        inner.stats.batches_flushed += 1;
        inner.stats.batched_requests += drained.len() as u64;

        let endpoint = drained
            .first()
            .map(|r| r.endpoint.clone())
            .unwrap_or_default();
        let timeframe = drained
            .first()
            .map(|r| r.timeframe.clone())
            .unwrap_or_default();

        let mut items = Vec::with_capacity(drained.len());
        let mut replies = Vec::with_capacity(drained.len());
        for req in drained {
            items.push(req.item);
            replies.push(req.reply);
        }

        Batch {
            endpoint,
            timeframe,
            items,
            replies,
        }
    }

    /// Grows the adaptive batch size toward `max_batch_size` after a clean
    /// flush, or shrinks it on repeated failures — analogous to the
    /// reference implementation's `adaptive_sizing` option.
    pub fn record_batch_outcome(&self, succeeded: bool) {
        let mut inner = self.inner.lock();
        if succeeded {
            inner.current_batch_size = (inner.current_batch_size + 1).min(self.config.max_batch_size);
        } else {
            inner.stats.failed_requests += 1;
            inner.current_batch_size = (inner.current_batch_size / 2).max(1);
            debug!(new_size = inner.current_batch_size, "batch size reduced after failure");
        }
    }

    /// Pre-sizes a bulk sweep of `total` unrelated items (e.g. a holder
    /// refresh over every tracked address) into chunks no larger than the
    /// current adaptive batch size, mirroring `_calculate_batch_size`'s
    /// queue-length cap — a single chunk never exceeds what's actually left
    /// to do.
    pub fn plan_batches(&self, total: usize) -> Vec<usize> {
        if total == 0 {
            return Vec::new();
        }
        let chunk = self.inner.lock().current_batch_size.max(1).min(total);
        let mut plan = Vec::new();
        let mut remaining = total;
        while remaining > 0 {
            let take = chunk.min(remaining);
            plan.push(take);
            remaining -= take;
        }
        plan
    }

    pub fn retry_delay(&self, retry_count: usize) -> Option<Duration> {
        self.config.retry_delays.get(retry_count).copied()
    }

    pub fn stats(&self) -> BatchStats {
        self.inner.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_priority_drains_before_normal() {
        let coalescer = BatchCoalescer::new(BatchConfig::default());
        let _low = coalescer.enqueue("low".into(), "ep", "1h", Priority::Normal);
        let _crit = coalescer.enqueue("crit".into(), "ep", "1h", Priority::Critical);

        let batch = coalescer.drain_batch().unwrap();
        assert_eq!(batch.items, vec!["crit".to_string()]);
    }

    #[test]
    fn same_priority_preserves_fifo_order() {
        let coalescer = BatchCoalescer::new(BatchConfig::default());
        let _a = coalescer.enqueue("a".into(), "ep", "1h", Priority::High);
        let _b = coalescer.enqueue("b".into(), "ep", "1h", Priority::High);

        let batch = coalescer.drain_batch().unwrap();
        assert_eq!(batch.items, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn groups_by_endpoint_and_timeframe() {
        let coalescer = BatchCoalescer::new(BatchConfig::default());
        let _a = coalescer.enqueue("a".into(), "ep1", "1h", Priority::Normal);
        let _b = coalescer.enqueue("b".into(), "ep2", "1h", Priority::Normal);

        let batch = coalescer.drain_batch().unwrap();
        assert_eq!(batch.items.len(), 1);
    }

    #[tokio::test]
    async fn complete_delivers_results_to_waiters() {
        let coalescer = BatchCoalescer::new(BatchConfig::default());
        let rx_a = coalescer.enqueue("a".into(), "ep", "1h", Priority::Normal);
        let rx_b = coalescer.enqueue("b".into(), "ep", "1h", Priority::Normal);

        let batch = coalescer.drain_batch().unwrap();
        batch.complete(vec![Ok(serde_json::json!(1)), Ok(serde_json::json!(2))]);

        assert_eq!(rx_a.await.unwrap().unwrap(), serde_json::json!(1));
        assert_eq!(rx_b.await.unwrap().unwrap(), serde_json::json!(2));
    }

    #[test]
    fn adaptive_sizing_shrinks_on_failure_and_grows_on_success() {
        let coalescer = BatchCoalescer::new(BatchConfig {
            max_batch_size: 10,
            ..BatchConfig::default()
        });
        coalescer.record_batch_outcome(false);
        assert_eq!(coalescer.inner.lock().current_batch_size, 5);
        coalescer.record_batch_outcome(true);
        assert_eq!(coalescer.inner.lock().current_batch_size, 6);
    }

    #[test]
    fn plan_batches_chunks_by_current_batch_size() {
        let coalescer = BatchCoalescer::new(BatchConfig {
            max_batch_size: 4,
            ..BatchConfig::default()
        });
        assert_eq!(coalescer.plan_batches(10), vec![4, 4, 2]);
        assert_eq!(coalescer.plan_batches(0), Vec::<usize>::new());
        assert_eq!(coalescer.plan_batches(3), vec![3]);
    }

    #[test]
    fn retry_delays_follow_configured_sequence() {
        let coalescer = BatchCoalescer::new(BatchConfig::default());
        assert_eq!(coalescer.retry_delay(0), Some(Duration::from_secs(1)));
        assert_eq!(coalescer.retry_delay(2), Some(Duration::from_secs(4)));
        assert_eq!(coalescer.retry_delay(3), None);
    }
}
