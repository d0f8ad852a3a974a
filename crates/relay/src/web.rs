use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use vantage_protocol::{SessionSummary, VantageConfig};

use crate::rooms::RoomRegistry;
use crate::signaling;

/// Shared application state.
pub struct AppState {
    pub config: VantageConfig,
    pub rooms: Arc<RoomRegistry>,
    pub metrics: MetricsStore,
    pub started_at: std::time::Instant,
}

/// Append-only JSON document of session summaries, one array on disk.
///
/// A legacy single-object file is wrapped into an array on the first
/// append; an unreadable document is replaced rather than blocking the
/// append. Appends serialize on one lock.
pub struct MetricsStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

/// A stored summary plus the server-side receive timestamp.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsEntry {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub timestamp_ms: u64,
}

impl MetricsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Append one summary, returning the new entry count.
    pub async fn append(&self, summary: SessionSummary) -> anyhow::Result<usize> {
        let _guard = self.lock.lock().await;
        let mut entries: Vec<serde_json::Value> = match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(serde_json::Value::Array(items)) => items,
                Ok(other) => vec![other],
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        "Metrics document unreadable, starting fresh: {e}"
                    );
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        let entry = MetricsEntry {
            summary,
            timestamp_ms: epoch_ms(),
        };
        entries.push(serde_json::to_value(&entry)?);
        let data = serde_json::to_vec_pretty(&entries)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(entries.len())
    }

    /// The whole stored document; an empty array if nothing was saved yet.
    pub async fn read_document(&self) -> anyhow::Result<serde_json::Value> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(json!([])),
            Err(e) => Err(e.into()),
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(signaling_ws_upgrade))
        .route("/api/health", get(health))
        .route("/metrics", post(append_metrics))
        .route("/metrics.json", get(metrics_document))
        .layer(CorsLayer::permissive())
        // 5 MB request cap, matching the original deployment's body limit
        .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
        .with_state(state)
}

/// GET /ws - WebSocket upgrade for signaling.
async fn signaling_ws_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rooms = Arc::clone(&state.rooms);
    ws.max_message_size(65_536) // 64KB max for signaling messages
        .on_upgrade(move |socket| signaling::handle_signaling_ws(socket, rooms))
}

/// GET /api/health - liveness probe with room occupancy.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "rooms": state.rooms.room_count().await,
    }))
}

/// POST /metrics - append a session summary to the stored document.
async fn append_metrics(
    State(state): State<Arc<AppState>>,
    Json(summary): Json<SessionSummary>,
) -> impl IntoResponse {
    match state.metrics.append(summary).await {
        Ok(count) => {
            tracing::info!(count, "Appended session summary");
            Json(json!({ "ok": true })).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to append metrics: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false })),
            )
                .into_response()
        }
    }
}

/// GET /metrics.json - return the stored document.
async fn metrics_document(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.read_document().await {
        Ok(doc) => Json(doc).into_response(),
        Err(e) => {
            tracing::error!("Failed to read metrics document: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "metrics unavailable" })),
            )
                .into_response()
        }
    }
}
