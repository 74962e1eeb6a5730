use crate::error::CollectError;
use crate::metrics::{now_timestamp_ms, Sample};
use std::time::Duration;
use sysinfo::{Components, CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Collect one instantaneous composite reading of host metrics.
///
/// CPU utilization is averaged over `cpu_window` (two refreshes separated by
/// a sleep), so the call consumes part of the caller's tick period. The
/// window is clamped up to the minimum sysinfo supports.
pub async fn collect_sample(cpu_window: Duration) -> Result<Sample, CollectError> {
    let refresh = RefreshKind::nothing()
        .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
        .with_memory(MemoryRefreshKind::everything());
    let mut sys = System::new_with_specifics(refresh);

    // Usage is derived from the delta between two refreshes.
    tokio::time::sleep(cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
    sys.refresh_specifics(refresh);

    if sys.cpus().is_empty() {
        return Err(CollectError::Unavailable("cpu"));
    }
    let cpu_percent = sys.global_cpu_usage();

    let total_mem = sys.total_memory();
    if total_mem == 0 {
        return Err(CollectError::Unavailable("memory"));
    }
    let used_mem = total_mem.saturating_sub(sys.available_memory());
    let memory_percent = used_mem as f32 / total_mem as f32 * 100.0;

    let disk_percent = disk_usage_percent()?;

    let temperature = read_cpu_temperature().unwrap_or_else(|| {
        debug!("CPU temperature unavailable, substituting 0.0");
        0.0
    });

    Ok(Sample {
        timestamp_ms: now_timestamp_ms(),
        cpu_percent,
        memory_percent,
        disk_percent,
        temperature,
    })
}

/// Overall used percentage across all mounted disks.
fn disk_usage_percent() -> Result<f32, CollectError> {
    let disks = Disks::new_with_refreshed_list();
    let total: u64 = disks.iter().map(|d| d.total_space()).sum();
    if total == 0 {
        return Err(CollectError::Unavailable("disk"));
    }
    let available: u64 = disks.iter().map(|d| d.available_space()).sum();
    Ok(total.saturating_sub(available) as f32 / total as f32 * 100.0)
}

/// Best-effort CPU temperature in degrees Celsius, rounded to 0.1.
///
/// Tries the thermal zone sysfs file first (Raspberry Pi and most ARM
/// boards), then falls back to whichever component sensor looks like the CPU
/// package. `None` never escalates; the caller substitutes 0.0.
fn read_cpu_temperature() -> Option<f32> {
    if let Ok(raw) = std::fs::read_to_string(THERMAL_ZONE) {
        if let Ok(millideg) = raw.trim().parse::<f32>() {
            return Some((millideg / 1000.0 * 10.0).round() / 10.0);
        }
    }

    let components = Components::new_with_refreshed_list();
    components.iter().find_map(|c| {
        let label = c.label().to_ascii_lowercase();
        if label.contains("cpu")
            || label.contains("package")
            || label.contains("tctl")
            || label.contains("tdie")
        {
            c.temperature()
        } else {
            None
        }
    })
}
