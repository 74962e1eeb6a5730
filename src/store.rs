use crate::error::StoreError;
use crate::metrics::{now_timestamp_ms, Event, Sample};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS samples (
    timestamp       INTEGER NOT NULL,
    cpu_percent     REAL NOT NULL,
    memory_percent  REAL NOT NULL,
    disk_percent    REAL NOT NULL,
    temperature     REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_samples_timestamp ON samples(timestamp);

CREATE TABLE IF NOT EXISTS events (
    timestamp   INTEGER NOT NULL,
    event_type  TEXT NOT NULL,
    description TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
";

/// SQLite-backed store for samples and the event log.
///
/// Sessions are short-lived: every operation opens its own connection on a
/// blocking thread, and a counting semaphore bounds how many run at once.
/// Callers wait for a permit rather than fail. Cheap to clone; clones share
/// the semaphore.
#[derive(Clone)]
pub struct MetricsStore {
    path: Arc<PathBuf>,
    sessions: Arc<Semaphore>,
    retention: Duration,
}

#[derive(Clone, Debug, Serialize)]
pub struct StoreStats {
    pub sample_count: u64,
    pub earliest: Option<String>,
    pub latest: Option<String>,
    pub hours_covered: f64,
}

impl MetricsStore {
    /// Open the database, creating the schema if missing.
    pub async fn open(
        path: impl AsRef<Path>,
        retention: Duration,
        max_sessions: usize,
    ) -> Result<Self, StoreError> {
        let store = Self {
            path: Arc::new(path.as_ref().to_path_buf()),
            sessions: Arc::new(Semaphore::new(max_sessions)),
            retention,
        };
        store.with_conn(|conn| conn.execute_batch(SCHEMA)).await?;
        Ok(store)
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self.sessions.acquire().await?;
        let path = Arc::clone(&self.path);
        let result = task::spawn_blocking(move || -> Result<T, rusqlite::Error> {
            let mut conn = Connection::open(path.as_path())?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            op(&mut conn)
        })
        .await??;
        Ok(result)
    }

    /// Persist a batch in a single transaction, preserving append order, and
    /// purge rows older than the retention window before committing. The
    /// store is therefore self-bounding after every insert, with no separate
    /// maintenance job. An empty batch is a no-op with no I/O.
    pub async fn insert_samples(&self, samples: Vec<Sample>) -> Result<(), StoreError> {
        if samples.is_empty() {
            return Ok(());
        }
        let cutoff = now_timestamp_ms() - self.retention.as_millis() as i64;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO samples (timestamp, cpu_percent, memory_percent, disk_percent, temperature) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for s in &samples {
                    stmt.execute(params![
                        s.timestamp_ms,
                        f64::from(s.cpu_percent),
                        f64::from(s.memory_percent),
                        f64::from(s.disk_percent),
                        f64::from(s.temperature),
                    ])?;
                }
            }
            tx.execute("DELETE FROM samples WHERE timestamp < ?1", params![cutoff])?;
            tx.commit()
        })
        .await
    }

    /// Samples within the trailing `window`, ascending by timestamp.
    pub async fn query_samples(&self, window: Duration) -> Result<Vec<Sample>, StoreError> {
        let cutoff = now_timestamp_ms() - window.as_millis() as i64;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, cpu_percent, memory_percent, disk_percent, temperature \
                 FROM samples WHERE timestamp >= ?1 ORDER BY timestamp ASC",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| {
                Ok(Sample {
                    timestamp_ms: row.get(0)?,
                    cpu_percent: row.get::<_, f64>(1)? as f32,
                    memory_percent: row.get::<_, f64>(2)? as f32,
                    disk_percent: row.get::<_, f64>(3)? as f32,
                    temperature: row.get::<_, f64>(4)? as f32,
                })
            })?;
            rows.collect()
        })
        .await
    }

    /// Durable append to the event log. Strings are stored verbatim; the
    /// event log has no retention bound.
    pub async fn append_event(&self, event: Event) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO events (timestamp, event_type, description) VALUES (?1, ?2, ?3)",
                params![event.timestamp_ms, event.event_type, event.description],
            )?;
            Ok(())
        })
        .await
    }

    /// The most recent `limit` events, newest first.
    pub async fn recent_events(&self, limit: u32) -> Result<Vec<Event>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, event_type, description FROM events \
                 ORDER BY timestamp DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(Event {
                    timestamp_ms: row.get(0)?,
                    event_type: row.get(1)?,
                    description: row.get(2)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    /// Row count and covered time range of the samples table.
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let (count, min, max) = self
            .with_conn(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM samples", [], |r| r.get(0))?;
                let (min, max): (Option<i64>, Option<i64>) = conn.query_row(
                    "SELECT MIN(timestamp), MAX(timestamp) FROM samples",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )?;
                Ok((count, min, max))
            })
            .await?;
        let hours_covered = match (min, max) {
            (Some(a), Some(b)) => (b - a) as f64 / 3_600_000.0,
            _ => 0.0,
        };
        Ok(StoreStats {
            sample_count: count.max(0) as u64,
            earliest: min.and_then(format_timestamp),
            latest: max.and_then(format_timestamp),
            hours_covered,
        })
    }
}

fn format_timestamp(ms: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    async fn open_store(dir: &tempfile::TempDir) -> MetricsStore {
        MetricsStore::open(dir.path().join("metrics.db"), DAY, 5)
            .await
            .unwrap()
    }

    fn sample(ts: i64, cpu: f32, mem: f32, disk: f32, temp: f32) -> Sample {
        Sample {
            timestamp_ms: ts,
            cpu_percent: cpu,
            memory_percent: mem,
            disk_percent: disk,
            temperature: temp,
        }
    }

    #[tokio::test]
    async fn round_trip_preserves_values_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let t = now_timestamp_ms();

        store
            .insert_samples(vec![
                sample(t - 1_000, 10.0, 20.0, 30.0, 40.0),
                sample(t, 42.5, 60.0, 33.0, 55.2),
                sample(t + 1_000, 90.0, 80.0, 70.0, 60.0),
            ])
            .await
            .unwrap();

        let got = store.query_samples(DAY).await.unwrap();
        assert_eq!(got.len(), 3);
        assert!(got.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
        let mid = &got[1];
        assert_eq!(mid.timestamp_ms, t);
        assert!((mid.cpu_percent - 42.5).abs() < 1e-3);
        assert!((mid.memory_percent - 60.0).abs() < 1e-3);
        assert!((mid.disk_percent - 33.0).abs() < 1e-3);
        assert!((mid.temperature - 55.2).abs() < 1e-3);
    }

    #[tokio::test]
    async fn insert_purges_rows_outside_retention() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let t = now_timestamp_ms();
        let stale = t - 25 * 3_600_000;

        store
            .insert_samples(vec![
                sample(stale, 1.0, 1.0, 1.0, 1.0),
                sample(t, 50.0, 50.0, 50.0, 50.0),
            ])
            .await
            .unwrap();

        // The stale row must be gone immediately after the insert, not only
        // from windowed queries.
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.sample_count, 1);
        let got = store.query_samples(Duration::from_secs(365 * 24 * 3600)).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].timestamp_ms, t);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.insert_samples(Vec::new()).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.sample_count, 0);
        assert!(stats.earliest.is_none());
    }

    #[tokio::test]
    async fn windowed_query_excludes_older_samples() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let t = now_timestamp_ms();
        store
            .insert_samples(vec![
                sample(t - 2 * 3_600_000, 10.0, 10.0, 10.0, 10.0),
                sample(t, 20.0, 20.0, 20.0, 20.0),
            ])
            .await
            .unwrap();

        let got = store.query_samples(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].timestamp_ms, t);
    }

    #[tokio::test]
    async fn events_append_and_read_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        for (i, kind) in ["login", "service_restart", "error"].iter().enumerate() {
            store
                .append_event(Event {
                    timestamp_ms: 1_000 + i as i64,
                    event_type: (*kind).to_string(),
                    description: format!("event {i}"),
                })
                .await
                .unwrap();
        }

        let got = store.recent_events(2).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].event_type, "error");
        assert_eq!(got[1].event_type, "service_restart");
    }

    #[tokio::test]
    async fn stats_reports_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let t = now_timestamp_ms();
        store
            .insert_samples(vec![
                sample(t - 3_600_000, 10.0, 10.0, 10.0, 10.0),
                sample(t, 20.0, 20.0, 20.0, 20.0),
            ])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.sample_count, 2);
        assert!(stats.earliest.is_some());
        assert!(stats.latest.is_some());
        assert!((stats.hours_covered - 1.0).abs() < 0.01);
    }
}
