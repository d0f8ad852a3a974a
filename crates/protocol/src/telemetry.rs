use serde::{Deserialize, Serialize};

/// Label of the publisher-created data channel carrying latency pings.
pub const TELEMETRY_CHANNEL_LABEL: &str = "telemetry";

/// Messages on the telemetry side-channel (peer-to-peer, out of the relay's
/// view). Publisher to viewer only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TelemetryMessage {
    /// Timestamp ping: `t` is the publisher's send time in epoch milliseconds
    Ts { t: u64 },
}

/// Samples pushed to the metrics collaborator.
///
/// Latency samples come from the telemetry side-channel; detection samples
/// come from the (external) detection collaborator. Payload field names keep
/// the original record shapes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricsSample {
    Latency {
        #[serde(rename = "latencyMs")]
        latency_ms: u64,
    },
    Detection {
        #[serde(rename = "overlayTs")]
        overlay_ts: u64,
        #[serde(rename = "predsCount")]
        preds_count: u32,
    },
}

/// End-of-session summary accepted by the relay's `POST /metrics` sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub mode: String,
    pub processed_fps: f64,
    pub e2e_latency_ms: LatencyStats,
    pub uplink_kbps: Option<f64>,
    pub downlink_kbps: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub median: Option<f64>,
    pub p95: Option<f64>,
}
