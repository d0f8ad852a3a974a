use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vantage_protocol::{MetricsSample, TelemetryMessage};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;

use crate::metrics::MetricsSink;

pub(crate) fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Latency of one received ping, clamped at zero for skewed clocks.
pub fn latency_from_ping(now_ms: u64, ping: &TelemetryMessage) -> u64 {
    let TelemetryMessage::Ts { t } = ping;
    now_ms.saturating_sub(*t)
}

/// Publisher side: emit one timestamp ping per interval until the channel
/// leaves the open state. The first ping goes out one interval after open;
/// the channel is scoped to one negotiation and is never reopened.
pub(crate) fn spawn_ping_emitter(dc: Arc<RTCDataChannel>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if dc.ready_state() != RTCDataChannelState::Open {
                debug!("Telemetry channel no longer open, stopping pings");
                break;
            }
            let ping = TelemetryMessage::Ts { t: epoch_ms() };
            let json = match serde_json::to_string(&ping) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize telemetry ping: {e}");
                    break;
                }
            };
            if let Err(e) = dc.send_text(json).await {
                debug!("Telemetry send failed, stopping pings: {e}");
                break;
            }
        }
    })
}

/// Viewer side: turn inbound pings on a telemetry channel into latency
/// samples for the metrics sink. Malformed payloads are ignored.
pub(crate) fn attach_viewer_consumer(
    dc: &Arc<RTCDataChannel>,
    sink: Arc<dyn MetricsSink>,
    destroyed: Arc<AtomicBool>,
) {
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let sink = Arc::clone(&sink);
        let destroyed = Arc::clone(&destroyed);
        Box::pin(async move {
            if destroyed.load(Ordering::SeqCst) {
                return;
            }
            match serde_json::from_slice::<TelemetryMessage>(&msg.data) {
                Ok(ping) => {
                    let latency_ms = latency_from_ping(epoch_ms(), &ping);
                    sink.push(MetricsSample::Latency { latency_ms });
                }
                Err(e) => {
                    debug!("Ignoring malformed telemetry payload: {e}");
                }
            }
        })
    }));
}
