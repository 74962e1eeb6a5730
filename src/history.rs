use crate::metrics::Sample;
use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;

/// Bounded FIFO of recent samples for low-latency reads.
///
/// Admission is rate-limited by sample timestamp, keeping in-memory density
/// independent of the collector's tick rate. This is a preview source only;
/// durable storage remains the system of record. Only cloned snapshots cross
/// the boundary.
pub struct HistoryRing {
    capacity: usize,
    min_gap_ms: i64,
    inner: RwLock<Inner>,
}

struct Inner {
    ring: VecDeque<Sample>,
    last_admitted_ms: Option<i64>,
}

impl HistoryRing {
    pub fn new(capacity: usize, min_gap: Duration) -> Self {
        Self {
            capacity,
            min_gap_ms: min_gap.as_millis() as i64,
            inner: RwLock::new(Inner {
                ring: VecDeque::with_capacity(capacity),
                last_admitted_ms: None,
            }),
        }
    }

    /// Admit a sample unless one was already admitted within the minimum
    /// gap. Evicts the oldest entry once at capacity. Returns whether the
    /// sample was admitted.
    pub fn admit(&self, sample: Sample) -> bool {
        let mut inner = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(last) = inner.last_admitted_ms {
            if sample.timestamp_ms.saturating_sub(last) < self.min_gap_ms {
                return false;
            }
        }
        if inner.ring.len() >= self.capacity {
            inner.ring.pop_front();
        }
        inner.last_admitted_ms = Some(sample.timestamp_ms);
        inner.ring.push_back(sample);
        true
    }

    pub fn latest(&self) -> Option<Sample> {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.ring.back().cloned()
    }

    /// The most recent `limit` admitted samples in chronological order, or
    /// everything when no limit is given.
    pub fn snapshot(&self, limit: Option<usize>) -> Vec<Sample> {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let len = inner.ring.len();
        let take = limit.unwrap_or(len).min(len);
        inner.ring.iter().skip(len - take).cloned().collect()
    }

    pub fn len(&self) -> usize {
        let inner = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
