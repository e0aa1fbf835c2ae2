use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging & OpenTelemetry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Log output and optional trace export for the `serve` command.
///
/// With no `otlp_endpoint` the bridge only writes structured logs to
/// stdout.  Setting it adds an OTLP/gRPC exporter so session and stream
/// spans are forwarded to a collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Emit one JSON object per log line.  `false` switches to the
    /// human-readable compact formatter.
    #[serde(default = "d_true")]
    pub json_logs: bool,

    /// OTLP gRPC endpoint (e.g. `http://localhost:4317`).
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// The `service.name` resource attribute reported to the collector.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Trace sampling rate (`0.0` = never, `1.0` = always).
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json_logs: true,
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

fn d_true() -> bool {
    true
}

fn d_service_name() -> String {
    "podbridge".into()
}

fn d_sample_rate() -> f64 {
    1.0
}
