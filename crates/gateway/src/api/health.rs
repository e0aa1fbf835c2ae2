use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /v1/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_secs = (chrono::Utc::now() - state.started_at).num_seconds().max(0);
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime_secs,
        "sessions": state.pool.len(),
        "recognizer": state.recognizer.is_some(),
    }))
}
