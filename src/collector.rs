use crate::buffer::SampleBuffer;
use crate::history::HistoryRing;
use crate::sampler;
use crate::store::MetricsStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct CollectorConfig {
    pub interval: Duration,
    pub cpu_window: Duration,
}

/// Background collection loop: sample on a fixed cadence, admit into the
/// in-memory history ring, and hand flush batches to the store.
///
/// A failed tick is logged and skipped; nothing terminates the loop except
/// cancellation.
pub struct Collector {
    config: CollectorConfig,
    buffer: Arc<SampleBuffer>,
    history: Arc<HistoryRing>,
    store: MetricsStore,
}

impl Collector {
    pub fn new(
        config: CollectorConfig,
        buffer: Arc<SampleBuffer>,
        history: Arc<HistoryRing>,
        store: MetricsStore,
    ) -> Self {
        Self {
            config,
            buffer,
            history,
            store,
        }
    }

    /// Spawn the loop and return its lifecycle handle.
    pub fn start(self) -> CollectorHandle {
        let cancel = CancellationToken::new();
        let buffer = Arc::clone(&self.buffer);
        let store = self.store.clone();
        let handle = tokio::spawn(self.run(cancel.clone()));
        CollectorHandle {
            cancel,
            handle,
            buffer,
            store,
        }
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("collector started with interval {:?}", self.config.interval);

        loop {
            // Cancellation is checked first, so shutdown wins even against
            // an already-elapsed tick.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let sample = match sampler::collect_sample(self.config.cpu_window).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("metric collection failed, skipping tick: {e}");
                    continue;
                }
            };

            self.history.admit(sample.clone());

            if let Some(batch) = self.buffer.push(sample) {
                let count = batch.len();
                if let Err(e) = self.store.insert_samples(batch).await {
                    // Availability over durability: stale samples are not retried.
                    error!("dropping {count} buffered samples: {e}");
                } else {
                    debug!("flushed {count} samples");
                }
            }
        }

        info!("collector stopped");
    }
}

/// Lifecycle control for the spawned collector task.
pub struct CollectorHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    buffer: Arc<SampleBuffer>,
    store: MetricsStore,
}

impl CollectorHandle {
    /// Cancel the loop, wait for it to exit, and persist whatever is still
    /// buffered. Consuming the handle makes this single-use; no task or
    /// samples are left orphaned.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("collector task failed: {e}");
        }

        let residue = self.buffer.drain();
        if residue.is_empty() {
            return;
        }
        let count = residue.len();
        match self.store.insert_samples(residue).await {
            Ok(()) => info!("flushed {count} samples at shutdown"),
            Err(e) => error!("dropping {count} samples at shutdown: {e}"),
        }
    }
}
