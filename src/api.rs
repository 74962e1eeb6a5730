use crate::history::HistoryRing;
use crate::metrics::{now_timestamp_ms, ErrorResponse, Event};
use crate::plot::{self, ChartRenderer};
use crate::sampler;
use crate::store::MetricsStore;
use crate::stream::{LiveSource, StreamSession};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<HistoryRing>,
    pub store: MetricsStore,
    pub renderer: Arc<ChartRenderer>,
    pub cpu_window: Duration,
    pub stream_period: Duration,
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/metrics", get(live_metrics))
        .route("/api/metrics/recent", get(recent_metrics))
        .route("/api/history", get(history))
        .route("/api/events", get(recent_events).post(append_event))
        .route("/api/stats", get(stats))
        .route("/metrics.png", get(metrics_png))
        .route("/api/stream", get(stream))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" })).into_response()
}

/// One freshly collected composite reading, independent of buffering and
/// history state.
async fn live_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match sampler::collect_sample(state.cpu_window).await {
        Ok(sample) => (StatusCode::OK, Json(sample)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// In-memory history ring preview; cheaper than hitting durable storage.
async fn recent_metrics(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> impl IntoResponse {
    (StatusCode::OK, Json(state.history.snapshot(query.limit))).into_response()
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<u64>,
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let window = Duration::from_secs(query.hours.unwrap_or(24) * 3600);
    match state.store.query_samples(window).await {
        Ok(samples) => (StatusCode::OK, Json(samples)).into_response(),
        Err(e) => {
            error!("history query failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub limit: Option<u32>,
}

async fn recent_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    match state.store.recent_events(query.limit.unwrap_or(10)).await {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(e) => {
            error!("event query failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct NewEvent {
    pub timestamp_ms: Option<i64>,
    pub event_type: String,
    pub description: String,
}

/// Durable append to the event log. Type and description are taken verbatim.
async fn append_event(
    State(state): State<AppState>,
    Json(body): Json<NewEvent>,
) -> impl IntoResponse {
    let event = Event {
        timestamp_ms: body.timestamp_ms.unwrap_or_else(now_timestamp_ms),
        event_type: body.event_type,
        description: body.description,
    };
    match state.store.append_event(event.clone()).await {
        Ok(()) => (StatusCode::CREATED, Json(event)).into_response(),
        Err(e) => {
            error!("event append failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => {
            error!("stats query failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Chart of the trailing 24 hours; 404 when no samples exist rather than an
/// empty chart.
async fn metrics_png(State(state): State<AppState>) -> impl IntoResponse {
    match plot::render_recent(state.renderer.clone(), &state.store, plot::DEFAULT_WINDOW).await {
        Ok(Some(png)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/png"),
                (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            ],
            png,
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no samples in the last 24 hours".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("chart render failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Live metrics push. Each cycle emits a `data:` frame with a fresh snapshot
/// followed by a `: heartbeat` comment frame, then sleeps the stream period.
/// Dropping the connection drops the session mid-cycle; no keep-alive layer
/// is added on top since the publisher emits its own heartbeats.
async fn stream(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let session = StreamSession::new(
        LiveSource {
            cpu_window: state.cpu_window,
        },
        state.stream_period,
    );
    let shutdown = state.shutdown.clone();

    let frames = futures::stream::unfold(session, |mut session| async move {
        let sample = session.next_cycle().await?;
        let events = match serde_json::to_string(&sample) {
            Ok(json) => vec![
                Ok(SseEvent::default().data(json)),
                Ok(SseEvent::default().comment("heartbeat")),
            ],
            Err(e) => vec![Ok(SseEvent::default()
                .event("error")
                .data(format!("serialize_error: {e}")))],
        };
        Some((futures::stream::iter(events), session))
    })
    .flatten()
    .take_until(async move { shutdown.cancelled().await });

    Sse::new(frames)
}
