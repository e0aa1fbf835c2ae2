pub mod auth;
pub mod health;
pub mod sessions;
pub mod stream;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use pb_sessions::SessionError;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the bearer-token middleware).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health::health));

    let protected = Router::new()
        // Device sessions
        .route("/v1/sessions", get(sessions::list_sessions))
        .route(
            "/v1/sessions/:serial",
            post(sessions::acquire_session).delete(sessions::release_session),
        )
        .route("/v1/sessions/:serial/touch", post(sessions::touch_session))
        // Audio streaming
        .route("/v1/stream/:serial", post(stream::stream_audio))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Map a session pool failure onto an HTTP status.
pub(crate) fn session_error(err: &SessionError) -> Response {
    let status = match err {
        SessionError::DeviceNotRegistered(_) => StatusCode::NOT_FOUND,
        SessionError::MissingCredential(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::ConnectionFailed { .. }
        | SessionError::HealthCheckFailed { .. }
        | SessionError::SubscriptionFailed { .. } => StatusCode::BAD_GATEWAY,
        SessionError::CreationGateTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    api_error(status, err.to_string())
}
