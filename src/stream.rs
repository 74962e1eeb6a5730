use crate::error::CollectError;
use crate::metrics::Sample;
use crate::sampler;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Consecutive collection failures tolerated before a stream closes.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;
/// Pause between attempts after a failed collection.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Source of live samples for a stream session. Abstracted so the retry
/// state machine can be exercised without real sensors.
pub trait SampleSource: Send {
    fn collect(&mut self) -> impl Future<Output = Result<Sample, CollectError>> + Send;
}

/// Production source: a fresh instantaneous reading per call, never ring or
/// durable-storage data.
pub struct LiveSource {
    pub cpu_window: Duration,
}

impl SampleSource for LiveSource {
    async fn collect(&mut self) -> Result<Sample, CollectError> {
        sampler::collect_sample(self.cpu_window).await
    }
}

/// Per-connection publisher loop: collect, emit, sleep, repeat.
///
/// The session stays active across transient collection failures, retrying
/// with a short backoff; the third consecutive failure closes it. A success
/// resets the failure counter. Dropping the session mid-cycle (peer
/// disconnect) cancels it without further collection calls.
pub struct StreamSession<S> {
    source: S,
    period: Duration,
    failures: u32,
    started: bool,
}

impl<S: SampleSource> StreamSession<S> {
    pub fn new(source: S, period: Duration) -> Self {
        Self {
            source,
            period,
            failures: 0,
            started: false,
        }
    }

    /// Produce the next sample to publish, or `None` once the session has
    /// failed permanently. The first cycle collects immediately; later
    /// cycles sleep the stream period first.
    pub async fn next_cycle(&mut self) -> Option<Sample> {
        if self.started {
            tokio::time::sleep(self.period).await;
        } else {
            self.started = true;
        }
        loop {
            match self.source.collect().await {
                Ok(sample) => {
                    self.failures = 0;
                    return Some(sample);
                }
                Err(e) => {
                    self.failures += 1;
                    warn!(
                        "stream collection failed (attempt {}/{}): {e}",
                        self.failures, MAX_CONSECUTIVE_FAILURES
                    );
                    if self.failures >= MAX_CONSECUTIVE_FAILURES {
                        info!("closing stream after {} consecutive failures", self.failures);
                        return None;
                    }
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    struct ScriptedSource {
        script: VecDeque<Result<Sample, CollectError>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Sample, CollectError>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl SampleSource for ScriptedSource {
        async fn collect(&mut self) -> Result<Sample, CollectError> {
            self.script
                .pop_front()
                .unwrap_or(Err(CollectError::Unavailable("script exhausted")))
        }
    }

    fn sample(ts: i64) -> Sample {
        Sample {
            timestamp_ms: ts,
            cpu_percent: 20.0,
            memory_percent: 40.0,
            disk_percent: 60.0,
            temperature: 48.0,
        }
    }

    fn fail() -> Result<Sample, CollectError> {
        Err(CollectError::Unavailable("induced"))
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_within_the_retry_budget() {
        let source = ScriptedSource::new(vec![fail(), fail(), Ok(sample(1))]);
        let mut session = StreamSession::new(source, Duration::from_secs(15));

        let got = session.next_cycle().await;
        assert_eq!(got.unwrap().timestamp_ms, 1);
        assert_eq!(session.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_after_three_consecutive_failures() {
        let source = ScriptedSource::new(vec![fail(), fail(), fail()]);
        let mut session = StreamSession::new(source, Duration::from_secs(15));

        assert!(session.next_cycle().await.is_none());
        assert_eq!(session.consecutive_failures(), MAX_CONSECUTIVE_FAILURES);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_count_does_not_carry_across_successes() {
        let source = ScriptedSource::new(vec![fail(), fail(), Ok(sample(1)), fail(), fail(), Ok(sample(2))]);
        let mut session = StreamSession::new(source, Duration::from_secs(15));

        assert_eq!(session.next_cycle().await.unwrap().timestamp_ms, 1);
        assert_eq!(session.next_cycle().await.unwrap().timestamp_ms, 2);
        assert_eq!(session.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_the_period_between_cycles_only() {
        let source = ScriptedSource::new(vec![Ok(sample(1)), Ok(sample(2))]);
        let mut session = StreamSession::new(source, Duration::from_secs(15));

        let start = Instant::now();
        session.next_cycle().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        session.next_cycle().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_between_retries() {
        let source = ScriptedSource::new(vec![fail(), Ok(sample(1))]);
        let mut session = StreamSession::new(source, Duration::from_secs(15));

        let start = Instant::now();
        session.next_cycle().await.unwrap();
        assert_eq!(start.elapsed(), RETRY_BACKOFF);
    }
}
