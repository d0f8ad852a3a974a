use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use vantage_protocol::Envelope;

use crate::session::SessionEvent;

pub(crate) type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub(crate) async fn connect(server_url: &str) -> anyhow::Result<WsStream> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(server_url)
        .await
        .context("WebSocket connection failed")?;
    info!(url = server_url, "Connected to signaling server");
    Ok(ws_stream)
}

/// Pump the signaling socket for one session.
///
/// Inbound envelopes become session events; the session's outbound queue is
/// drained onto the socket. Close and error both surface as lifecycle
/// events. The task never reconnects, since the session's grace window is
/// the only reconnection bound. Dropping the outbound sender closes the
/// socket politely.
pub(crate) fn spawn_signaling_task(
    ws: WsStream,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut outbound: mpsc::UnboundedReceiver<Envelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut ws_tx, mut ws_rx) = ws.split();
        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<Envelope>(&text) {
                                Ok(envelope) => {
                                    if events.send(SessionEvent::Signal(envelope)).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    debug!("Dropping malformed signaling frame: {e}");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Signaling socket closed");
                            let _ = events.send(SessionEvent::SignalingLost { error: false });
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("Signaling socket error: {e}");
                            let _ = events.send(SessionEvent::SignalingLost { error: true });
                            break;
                        }
                        Some(Ok(_)) => {} // ping/pong/binary
                    }
                }
                envelope = outbound.recv() => {
                    match envelope {
                        Some(envelope) => {
                            let text = match serde_json::to_string(&envelope) {
                                Ok(t) => t,
                                Err(e) => {
                                    warn!("Failed to serialize envelope: {e}");
                                    continue;
                                }
                            };
                            if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                                warn!("Signaling send failed: {e}");
                                let _ = events.send(SessionEvent::SignalingLost { error: true });
                                break;
                            }
                        }
                        // Outbound queue dropped by teardown
                        None => {
                            let _ = ws_tx.close().await;
                            break;
                        }
                    }
                }
            }
        }
    })
}
