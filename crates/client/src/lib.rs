//! Vantage client: drives one peer media session against a signaling relay.
//!
//! [`Session`] owns every resource a session acquires (peer transport,
//! signaling socket, capture handle, telemetry channel, timers) and
//! guarantees a single, idempotent teardown under every exit path. Capture,
//! rendering and metrics consumption stay behind the [`MediaSource`],
//! remote-track callback and [`MetricsSink`] seams.

pub mod media;
pub mod metrics;
pub mod peer;
pub mod session;
mod signaling;
mod telemetry;

pub use media::{H264FileSource, MediaSource};
pub use metrics::{MetricsRecorder, MetricsSink, WindowStats};
pub use peer::IceServerConfig;
pub use session::{
    RemoteTrackCallback, Role, Session, SessionConfig, SessionHandle, SessionState, StartError,
};
pub use telemetry::latency_from_ping;
