//! Device session endpoints.
//!
//! Thin wrappers over [`SessionPool`](pb_sessions::SessionPool).  Device ids
//! in the path are matched case-insensitively.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use pb_sessions::{telemetry, ReleaseReason};

use super::{api_error, session_error};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.pool.list();
    let count = sessions.len();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": count,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/:serial
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Acquire (creating on first use) the device's session and make sure its
/// telemetry consumer is running.
pub async fn acquire_session(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> impl IntoResponse {
    match state.pool.acquire(&serial).await {
        Ok(session) => {
            session.touch();
            telemetry::spawn_consumer(session.clone());
            Json(serde_json::json!({ "session": session.info() })).into_response()
        }
        Err(e) => session_error(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /v1/sessions/:serial
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn release_session(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> impl IntoResponse {
    match state.pool.release(&serial, ReleaseReason::Server).await {
        Ok(released) => Json(serde_json::json!({ "released": released })).into_response(),
        Err(e) => session_error(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/:serial/touch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn touch_session(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> impl IntoResponse {
    if state.pool.touch(&serial) {
        Json(serde_json::json!({ "touched": true })).into_response()
    } else {
        api_error(StatusCode::NOT_FOUND, "no active session for device")
    }
}
