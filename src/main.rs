use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use sysdash::api::{router, AppState};
use sysdash::buffer::SampleBuffer;
use sysdash::collector::{Collector, CollectorConfig};
use sysdash::config::Config;
use sysdash::history::HistoryRing;
use sysdash::plot::ChartRenderer;
use sysdash::runtime;
use sysdash::store::MetricsStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    runtime::init_tracing();
    let config = Config::parse();
    info!(
        "starting: bind={}:{}, db={}, interval={}ms",
        config.bind,
        config.port,
        config.db.display(),
        config.interval_ms
    );

    if let Some(parent) = config.db.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!("cannot create {}: {e}", parent.display());
                std::process::exit(1);
            }
        }
    }

    let store = match MetricsStore::open(&config.db, config.retention(), config.db_sessions).await {
        Ok(s) => s,
        Err(e) => {
            error!("cannot open metrics store: {e}");
            std::process::exit(1);
        }
    };

    let buffer = Arc::new(SampleBuffer::new(config.flush_batch, config.flush_age()));
    let history = Arc::new(HistoryRing::new(config.history, config.history_gap()));
    let renderer = Arc::new(ChartRenderer::new(1000, 600));
    let shutdown = CancellationToken::new();

    let collector = Collector::new(
        CollectorConfig {
            interval: config.interval(),
            cpu_window: config.cpu_window(),
        },
        Arc::clone(&buffer),
        Arc::clone(&history),
        store.clone(),
    )
    .start();

    let app = router(AppState {
        history,
        store,
        renderer,
        cpu_window: config.cpu_window(),
        stream_period: config.stream_interval(),
        shutdown: shutdown.clone(),
    });

    let addr = SocketAddr::from((config.bind, config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("cannot bind {addr}: {e}");
            collector.stop().await;
            std::process::exit(1);
        }
    };
    info!("listening on http://{addr}");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        runtime::shutdown_signal().await;
        info!("shutdown signal received");
        signal_shutdown.cancel();
    });

    let serve_shutdown = shutdown.clone();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await
    {
        error!("server error: {e}");
    }

    // Also reached when serve exits on error; cancelling twice is harmless.
    shutdown.cancel();
    collector.stop().await;
    info!("shutdown complete");
}
