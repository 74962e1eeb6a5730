use crate::error::RenderError;
use crate::metrics::Sample;
use crate::store::MetricsStore;
use image::{ImageFormat, RgbImage};
use plotters::prelude::*;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task;

/// Implicit chart window when callers pass no range.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

const CPU_COLOR: RGBColor = RGBColor(0x34, 0x98, 0xdb);
const MEMORY_COLOR: RGBColor = RGBColor(0xe7, 0x4c, 0x3c);
const GRID_COLOR: RGBColor = RGBColor(0xe8, 0xe8, 0xe8);

/// Renders the CPU/memory time-series chart as PNG bytes.
///
/// The drawing backend holds non-reentrant state, so every render runs under
/// `lock` for its full duration. The lock is distinct from the sample buffer
/// lock: rendering and collection never block each other.
pub struct ChartRenderer {
    width: u32,
    height: u32,
    lock: Mutex<()>,
}

impl ChartRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            lock: Mutex::new(()),
        }
    }

    /// Draw `samples` (ascending by time) as two series against a fixed
    /// 0..100 y-axis and return the encoded PNG.
    pub fn render(&self, samples: &[Sample]) -> Result<Vec<u8>, RenderError> {
        let _guard = match self.lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let (width, height) = (self.width, self.height);
        let mut raw = vec![0u8; width as usize * height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut raw, (width, height)).into_drawing_area();
            root.fill(&WHITE).map_err(draw_err)?;

            let first = samples.first().map(|s| s.timestamp_ms).unwrap_or(0);
            let mut last = samples.last().map(|s| s.timestamp_ms).unwrap_or(0);
            if last <= first {
                // Single-sample window; widen so the coordinate range stays valid.
                last = first + 1;
            }

            let mut chart = ChartBuilder::on(&root)
                .margin(12)
                .build_cartesian_2d(first..last, 0f64..100f64)
                .map_err(draw_err)?;
            chart
                .configure_mesh()
                .light_line_style(&GRID_COLOR)
                .draw()
                .map_err(draw_err)?;
            chart
                .draw_series(LineSeries::new(
                    samples
                        .iter()
                        .map(|s| (s.timestamp_ms, f64::from(s.cpu_percent))),
                    CPU_COLOR.stroke_width(2),
                ))
                .map_err(draw_err)?;
            chart
                .draw_series(LineSeries::new(
                    samples
                        .iter()
                        .map(|s| (s.timestamp_ms, f64::from(s.memory_percent))),
                    MEMORY_COLOR.stroke_width(2),
                ))
                .map_err(draw_err)?;
            root.present().map_err(draw_err)?;
        }

        let img = RgbImage::from_raw(width, height, raw)
            .ok_or_else(|| RenderError::Draw("pixel buffer size mismatch".to_string()))?;
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }
}

fn draw_err<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Draw(e.to_string())
}

/// Query the trailing `window` and render it on a blocking thread.
///
/// Returns `Ok(None)` when the store holds no samples in the window; callers
/// map that to "not found" rather than rendering an empty chart.
pub async fn render_recent(
    renderer: Arc<ChartRenderer>,
    store: &MetricsStore,
    window: Duration,
) -> Result<Option<Vec<u8>>, RenderError> {
    let samples = store.query_samples(window).await?;
    if samples.is_empty() {
        return Ok(None);
    }
    let png = task::spawn_blocking(move || renderer.render(&samples)).await??;
    Ok(Some(png))
}
