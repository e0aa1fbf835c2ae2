//! API authentication middleware.
//!
//! The token comes from `server.api_token` or the env var named by
//! `server.api_token_env` (default `PB_API_TOKEN`), read **once at startup**
//! and cached in `AppState` as a SHA-256 digest.
//! - With a token configured, every protected request must carry
//!   `Authorization: Bearer <token>`.
//! - Without one, access is unauthenticated (dev mode).

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::api_error;
use crate::state::AppState;

/// Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_hash) = &state.api_token_hash else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    // Compare fixed-length digests so the token length does not leak.
    let provided_hash = Sha256::digest(provided.as_bytes());
    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return api_error(StatusCode::UNAUTHORIZED, "invalid or missing API token");
    }

    next.run(req).await
}
