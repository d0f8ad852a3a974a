use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::mpsc;
use uuid::Uuid;
use vantage_protocol::Envelope;

use crate::rooms::RoomRegistry;

/// Drive one signaling WebSocket until it closes.
///
/// The first valid `join` frame maps the connection to a room; envelopes
/// arriving before that are ignored. Malformed frames are logged and dropped
/// without closing the connection. The connection is always deregistered on
/// exit, whether the socket closed cleanly or errored.
pub async fn handle_signaling_ws(mut socket: WebSocket, registry: Arc<RoomRegistry>) {
    let member_id = Uuid::new_v4();
    let (tx, mut outbound) = mpsc::unbounded_channel::<String>();
    let mut room: Option<String> = None;

    tracing::info!(%member_id, "Signaling WebSocket connected");

    loop {
        tokio::select! {
            // Frames queued by the registry: joined acks and routed envelopes
            Some(frame) = outbound.recv() => {
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    tracing::debug!(%member_id, "Signaling WebSocket send failed");
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(Envelope::Join { room_id }) => {
                                // Re-joining the same room just re-registers;
                                // a join naming a new room moves the connection.
                                if room.as_deref() != Some(room_id.as_str())
                                    && let Some(prev) = room.take()
                                {
                                    registry.leave(member_id, &prev).await;
                                }
                                registry.join(member_id, &room_id, &tx).await;
                                room = Some(room_id);
                            }
                            Ok(envelope) => match &room {
                                Some(joined) => {
                                    // Fan out the original frame text so payloads
                                    // pass through byte-for-byte. Routing uses the
                                    // joined room, not whatever the envelope claims.
                                    if envelope.room_id() != joined {
                                        tracing::debug!(
                                            %member_id,
                                            joined,
                                            claimed = envelope.room_id(),
                                            "Envelope names a different room"
                                        );
                                    }
                                    registry.route(member_id, joined, &text).await;
                                }
                                None => {
                                    tracing::debug!(%member_id, "Ignoring envelope before join");
                                }
                            },
                            Err(e) => {
                                tracing::warn!(%member_id, "Malformed signaling frame: {e}");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(%member_id, "Signaling WebSocket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(%member_id, "Signaling WebSocket error: {e}");
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary, nothing to route
                    None => break,
                }
            }
            else => break,
        }
    }

    if let Some(room_id) = room {
        registry.leave(member_id, &room_id).await;
    }
    tracing::info!(%member_id, "Signaling WebSocket disconnected");
}
