use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /health` — status plus pipeline counters.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let counters = state.supervisor.counters().snapshot();
    Json(json!({
        "status": "ok",
        "uptime_seconds": state.uptime_secs(),
        "streams": state.supervisor.index().stream_count(),
        "subscribers": state.supervisor.hub().subscriber_count(),
        "counters": counters,
    }))
}

/// `GET /metrics` — scrape-friendly text exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.supervisor.counters().render_text(),
    )
}
