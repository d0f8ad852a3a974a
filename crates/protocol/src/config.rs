use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VantageConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub ice: IceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path of the append-only metrics document
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

/// Client session timing knobs.
///
/// Both values are fixed constants in the original deployment (4 s, 1 s);
/// they are configuration here rather than hard-coded semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a transient ICE `disconnected` may last before the session
    /// is torn down
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Interval between telemetry timestamp pings
    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,
}

/// ICE/TURN server configuration for WebRTC NAT traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceConfig {
    /// STUN server URLs (default: Google's public STUN servers)
    #[serde(default = "default_stun_urls")]
    pub stun_urls: Vec<String>,
    /// TURN server URLs (e.g., "turn:turn.example.com:3478")
    #[serde(default)]
    pub turn_urls: Vec<String>,
    /// TURN username (for long-term credential mechanism)
    pub turn_username: Option<String>,
    /// TURN credential/password
    pub turn_credential: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            metrics_path: default_metrics_path(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            telemetry_interval_ms: default_telemetry_interval_ms(),
        }
    }
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_urls: default_stun_urls(),
            turn_urls: Vec::new(),
            turn_username: None,
            turn_credential: None,
        }
    }
}

impl VantageConfig {
    /// Validate the configuration, returning a list of issues found.
    ///
    /// Issues are prefixed with "ERROR:" (fatal, the server should not
    /// start) or "WARNING:" (advisory).
    ///
    /// Returns `Ok(())` if no issues, or `Err(issues)` with all found problems.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        // --- Port ---
        if self.server.port == 0 {
            issues.push("ERROR: server.port must be between 1 and 65535, got 0.".to_string());
        }

        // --- Metrics path ---
        if self.server.metrics_path.trim().is_empty() {
            issues.push(
                "ERROR: server.metrics_path must not be empty. \
                 Point it at a writable JSON file, e.g. metrics.json."
                    .to_string(),
            );
        }

        // --- Grace period ---
        if self.session.grace_period_ms == 0 {
            issues.push(
                "ERROR: session.grace_period_ms must be >= 1. \
                 A zero grace period tears every session down on the first \
                 transient disconnect."
                    .to_string(),
            );
        } else if self.session.grace_period_ms > 60_000 {
            issues.push(format!(
                "WARNING: session.grace_period_ms is {} ms — sessions will linger \
                 for over a minute after the peer vanishes. Typical values: 2000-10000 ms.",
                self.session.grace_period_ms
            ));
        }

        // --- Telemetry cadence ---
        if self.session.telemetry_interval_ms == 0 {
            issues.push(
                "ERROR: session.telemetry_interval_ms must be >= 1.".to_string(),
            );
        } else if self.session.telemetry_interval_ms < 100 {
            issues.push(format!(
                "WARNING: session.telemetry_interval_ms is {} ms — the side-channel \
                 is meant for low-rate pings. Typical values: 500-5000 ms.",
                self.session.telemetry_interval_ms
            ));
        }

        // --- STUN URLs ---
        for url in &self.ice.stun_urls {
            if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                issues.push(format!(
                    "ERROR: STUN URL '{}' must start with 'stun:' or 'stuns:'. \
                     Example: stun:stun.l.google.com:19302",
                    url
                ));
            }
        }

        // --- TURN URLs ---
        for url in &self.ice.turn_urls {
            if !url.starts_with("turn:") && !url.starts_with("turns:") {
                issues.push(format!(
                    "ERROR: TURN URL '{}' must start with 'turn:' or 'turns:'. \
                     Example: turn:turn.example.com:3478",
                    url
                ));
            }
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_metrics_path() -> String {
    "metrics.json".to_string()
}
fn default_grace_period_ms() -> u64 {
    4000
}
fn default_telemetry_interval_ms() -> u64 {
    1000
}
fn default_stun_urls() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun1.l.google.com:19302".to_string(),
    ]
}
