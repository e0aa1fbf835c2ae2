//! AppState construction extracted from `main.rs`.
//!
//! [`build_app_state`] wires the production transports; tests call
//! [`build_app_state_with`] to inject in-process fakes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};

use pb_domain::config::{Config, ConfigSeverity, ServerConfig};
use pb_sessions::{ConfigDirectory, DeviceConnector, SessionPool, SessionPoolConfig};
use pb_streaming::{PipelineConfig, Recognizer, StreamingPipeline};

use crate::devices::TcpConnector;
use crate::recognizer::HttpRecognizer;
use crate::state::AppState;

/// Validate config, build the TCP device connector and HTTP recognizer, and
/// return a fully-wired [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let connector: Arc<dyn DeviceConnector> = Arc::new(TcpConnector::new(&config.device));
    tracing::info!(
        connect_timeout_ms = config.device.connect_timeout_ms,
        "TCP device connector ready"
    );

    let recognizer: Option<Arc<dyn Recognizer>> = match &config.recognizer.url {
        Some(url) if !url.is_empty() => {
            let client = HttpRecognizer::new(
                url.clone(),
                Duration::from_millis(config.recognizer.timeout_ms),
            )
            .context("building recognizer HTTP client")?;
            tracing::info!(url = %url, "HTTP recognizer ready");
            Some(Arc::new(client))
        }
        _ => {
            tracing::warn!("no [recognizer] url configured; audio streaming disabled");
            None
        }
    };

    build_app_state_with(config, connector, recognizer)
}

/// Same as [`build_app_state`] with caller-supplied collaborators.
pub fn build_app_state_with(
    config: Arc<Config>,
    connector: Arc<dyn DeviceConnector>,
    recognizer: Option<Arc<dyn Recognizer>>,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }

    // ── Device directory + session pool ──────────────────────────────
    let directory = Arc::new(ConfigDirectory::new(config.devices.clone()));
    let pool = SessionPool::new(
        directory.clone(),
        connector,
        SessionPoolConfig::from(&config.sessions),
    );
    tracing::info!(
        robots = config.devices.robots.len(),
        idle_timeout_secs = config.sessions.idle_timeout_secs,
        "session pool ready"
    );

    // ── Streaming pipeline ───────────────────────────────────────────
    let pipeline = StreamingPipeline::new(PipelineConfig::from(&config.streaming));

    let api_token_hash = resolve_api_token(&config.server);

    Ok(AppState {
        config,
        started_at: chrono::Utc::now(),
        directory,
        pool,
        pipeline,
        recognizer,
        api_token_hash,
    })
}

/// Read the API token once and hash it for constant-time comparison.
///
/// Priority: `server.api_token` > env var named by `server.api_token_env`.
fn resolve_api_token(server: &ServerConfig) -> Option<Vec<u8>> {
    let env_var = &server.api_token_env;
    let token = server
        .api_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| ("config".to_string(), t.to_string()))
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .filter(|t| !t.is_empty())
                .map(|t| (format!("env:{env_var}"), t))
        });

    match token {
        Some((source, t)) => {
            tracing::info!(source = %source, "API bearer-token auth enabled");
            Some(Sha256::digest(t.as_bytes()).to_vec())
        }
        None => {
            tracing::warn!(
                "API bearer-token auth DISABLED, set server.api_token in config.toml or the {env_var} env var"
            );
            None
        }
    }
}
