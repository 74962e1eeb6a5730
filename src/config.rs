use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration. The defaults are the cadences and thresholds the
/// pipeline was designed around; any of them can be overridden per install.
#[derive(Clone, Debug, Parser)]
#[command(name = "sysdash", about = "Host telemetry dashboard service")]
pub struct Config {
    /// Bind address for the HTTP server
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// HTTP server port
    #[arg(long, default_value_t = 5900)]
    pub port: u16,

    /// SQLite database path
    #[arg(long, default_value = "data/metrics.db")]
    pub db: PathBuf,

    /// Background sampling interval in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub interval_ms: u64,

    /// CPU utilization averaging sub-window in milliseconds
    #[arg(long, default_value_t = 500)]
    pub cpu_window_ms: u64,

    /// Emit interval in seconds for live streams
    #[arg(long, default_value_t = 15)]
    pub stream_interval_secs: u64,

    /// In-memory history depth (number of samples)
    #[arg(long, default_value_t = 1440)]
    pub history: usize,

    /// Minimum gap in seconds between samples admitted to in-memory history
    #[arg(long, default_value_t = 10)]
    pub history_gap_secs: u64,

    /// Buffered sample count that triggers a flush
    #[arg(long, default_value_t = 30)]
    pub flush_batch: usize,

    /// Maximum buffer age in seconds before a flush
    #[arg(long, default_value_t = 300)]
    pub flush_age_secs: u64,

    /// Hours of samples kept in durable storage
    #[arg(long, default_value_t = 24)]
    pub retention_hours: u64,

    /// Maximum concurrent storage sessions
    #[arg(long, default_value_t = 5)]
    pub db_sessions: usize,
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_secs(self.stream_interval_secs)
    }

    pub fn history_gap(&self) -> Duration {
        Duration::from_secs(self.history_gap_secs)
    }

    pub fn flush_age(&self) -> Duration {
        Duration::from_secs(self.flush_age_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }
}
