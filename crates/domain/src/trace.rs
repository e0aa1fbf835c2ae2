use serde::Serialize;

/// Structured trace events emitted across podbridge crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        serial: String,
        target: String,
        generation: u64,
        duration_ms: u64,
    },
    SessionCreateFailed {
        serial: String,
        stage: String,
        error: String,
    },
    SessionReleased {
        serial: String,
        generation: u64,
        reason: String,
    },
    StreamFinished {
        device_id: String,
        request_id: String,
        stop_reason: String,
        chunks_written: usize,
        duration_ms: u64,
        ok: bool,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pb_event");
    }
}
