use crate::metrics::Sample;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Thread-safe accumulator of samples awaiting a batched write.
///
/// [`push`] hands out a flush batch when either threshold is crossed:
/// buffered count, or elapsed time since the previous flush. Capture and
/// clear happen under the same lock, so a sample can never end up in two
/// batches; the write itself is the caller's job and runs outside the lock.
///
/// [`push`]: SampleBuffer::push
pub struct SampleBuffer {
    max_samples: usize,
    max_age: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    samples: Vec<Sample>,
    last_flush: Instant,
}

impl SampleBuffer {
    pub fn new(max_samples: usize, max_age: Duration) -> Self {
        Self {
            max_samples,
            max_age,
            inner: Mutex::new(Inner {
                samples: Vec::new(),
                last_flush: Instant::now(),
            }),
        }
    }

    /// Append a sample, returning the drained batch when a flush threshold
    /// is crossed. Batch order is append order.
    pub fn push(&self, sample: Sample) -> Option<Vec<Sample>> {
        let mut inner = self.lock();
        inner.samples.push(sample);
        if inner.samples.len() >= self.max_samples || inner.last_flush.elapsed() >= self.max_age {
            inner.last_flush = Instant::now();
            return Some(std::mem::take(&mut inner.samples));
        }
        None
    }

    /// Unconditionally capture and clear the buffer (shutdown path). The
    /// result may be empty; writing an empty batch is the caller's no-op.
    pub fn drain(&self) -> Vec<Sample> {
        let mut inner = self.lock();
        inner.last_flush = Instant::now();
        std::mem::take(&mut inner.samples)
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            // Continue with the inner value even if poisoned.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample(i: i64) -> Sample {
        Sample {
            timestamp_ms: i,
            cpu_percent: 10.0,
            memory_percent: 40.0,
            disk_percent: 60.0,
            temperature: 50.0,
        }
    }

    #[test]
    fn size_threshold_flushes_exactly_once() {
        let buf = SampleBuffer::new(30, Duration::from_secs(300));
        for i in 0..29 {
            assert!(buf.push(sample(i)).is_none());
        }
        let batch = buf.push(sample(29)).expect("30th sample should flush");
        assert_eq!(batch.len(), 30);
        assert!(buf.is_empty());
        // Append order preserved through the flush.
        for (i, s) in batch.iter().enumerate() {
            assert_eq!(s.timestamp_ms, i as i64);
        }
    }

    #[test]
    fn age_threshold_flushes() {
        let buf = SampleBuffer::new(30, Duration::from_millis(20));
        assert!(buf.push(sample(0)).is_none());
        std::thread::sleep(Duration::from_millis(40));
        let batch = buf.push(sample(1)).expect("age threshold should flush");
        assert_eq!(batch.len(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn draining_empty_buffer_yields_nothing() {
        let buf = SampleBuffer::new(30, Duration::from_secs(300));
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn concurrent_appends_lose_nothing() {
        let buf = Arc::new(SampleBuffer::new(64, Duration::from_secs(300)));
        let mut handles = Vec::new();
        for t in 0..8 {
            let buf = Arc::clone(&buf);
            handles.push(std::thread::spawn(move || {
                for i in 0..4 {
                    assert!(buf.push(sample(t * 4 + i)).is_none());
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(buf.len(), 32);
    }

    #[test]
    fn concurrent_appends_across_flushes_conserve_samples() {
        let buf = Arc::new(SampleBuffer::new(10, Duration::from_secs(300)));
        let mut handles = Vec::new();
        for t in 0..8 {
            let buf = Arc::clone(&buf);
            handles.push(std::thread::spawn(move || {
                let mut flushed = 0usize;
                for i in 0..4 {
                    if let Some(batch) = buf.push(sample(t * 4 + i)) {
                        flushed += batch.len();
                    }
                }
                flushed
            }));
        }
        let flushed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(flushed + buf.len(), 32);
    }
}
