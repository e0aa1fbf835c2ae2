use std::sync::Arc;

use chrono::{DateTime, Utc};

use pb_domain::config::Config;
use pb_sessions::{ConfigDirectory, SessionPool};
use pb_streaming::{Recognizer, StreamingPipeline};

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub started_at: DateTime<Utc>,

    // ── Devices & sessions ────────────────────────────────────────────
    pub directory: Arc<ConfigDirectory>,
    pub pool: SessionPool,

    // ── Streaming ─────────────────────────────────────────────────────
    pub pipeline: StreamingPipeline,
    /// `None` when no `[recognizer] url` is configured; the stream
    /// endpoint then answers 503.
    pub recognizer: Option<Arc<dyn Recognizer>>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
