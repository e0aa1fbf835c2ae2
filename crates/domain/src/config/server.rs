use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_8084")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Bearer token for the session/stream endpoints.  Takes precedence
    /// over `api_token_env` when set and non-empty.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Environment variable holding the API bearer token.
    /// If neither this nor `api_token` yields a token, the server logs a
    /// warning and allows unauthenticated access.
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    /// Upper bound on in-flight HTTP requests.
    #[serde(default = "d_256")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8084,
            host: "127.0.0.1".into(),
            api_token: None,
            api_token_env: d_api_token_env(),
            max_concurrent_requests: 256,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8084() -> u16 {
    8084
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_api_token_env() -> String {
    "PB_API_TOKEN".into()
}
fn d_256() -> usize {
    256
}
