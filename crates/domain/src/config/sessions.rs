use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session pool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timing and filtering knobs for the device session pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// A session idle for this many reaper ticks is evicted.
    #[serde(default = "d_300")]
    pub idle_timeout_secs: u32,

    /// Length of one reaper tick.
    #[serde(default = "d_1000")]
    pub tick_ms: u64,

    /// How long `acquire` waits for an in-flight creation before giving up.
    #[serde(default = "d_30")]
    pub gate_timeout_secs: u64,

    /// Pause after clearing a streaming flag on release, so the streaming
    /// consumer can wind down before the connection is closed.
    #[serde(default = "d_2000")]
    pub release_grace_ms: u64,

    /// Event names requested from the device's event subscription.
    #[serde(default = "d_event_filter")]
    pub event_filter: Vec<String>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            tick_ms: 1000,
            gate_timeout_secs: 30,
            release_grace_ms: 2000,
            event_filter: d_event_filter(),
        }
    }
}

fn d_300() -> u32 {
    300
}
fn d_1000() -> u64 {
    1000
}
fn d_30() -> u64 {
    30
}
fn d_2000() -> u64 {
    2000
}
fn d_event_filter() -> Vec<String> {
    vec!["stimulation_info".into()]
}
