use std::collections::HashMap;

use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;
use vantage_protocol::Envelope;

/// Outbound frame queue for one signaling connection.
///
/// The connection's WebSocket task drains this; a closed queue is the
/// registry's signal that the socket is no longer open.
pub type FrameSender = mpsc::UnboundedSender<String>;

struct Member {
    id: Uuid,
    tx: FrameSender,
}

impl Member {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Room registry: room token → current members.
///
/// Owned by the server state (no global singleton) and shared across
/// connection tasks. Membership mutations and fan-out reads serialize on
/// one lock, so a `leave` racing a `route` never delivers to a half-removed
/// member. Per-member queues are FIFO, so sequential fan-out under the lock
/// preserves the sender's transmission order to each recipient.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Vec<Member>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Register a connection under `room_id`, creating the room if absent.
    ///
    /// Members whose queue has closed are evicted first, so a client
    /// rejoining with the same token replaces its dead predecessor without
    /// an explicit leave. The joiner gets a unicast `joined` ack; existing
    /// members are not notified.
    pub async fn join(&self, member_id: Uuid, room_id: &str, tx: &FrameSender) {
        let mut rooms = self.rooms.lock().await;
        let members = rooms.entry(room_id.to_string()).or_default();
        members.retain(|m| m.id != member_id && m.is_open());
        members.push(Member {
            id: member_id,
            tx: tx.clone(),
        });
        tracing::info!(%member_id, room_id, members = members.len(), "Member joined room");

        let ack = Envelope::Joined {
            room_id: room_id.to_string(),
        };
        match serde_json::to_string(&ack) {
            Ok(json) => {
                let _ = tx.send(json);
            }
            Err(e) => tracing::error!("Failed to serialize joined ack: {e}"),
        }
    }

    /// Broadcast `frame` unchanged to every other open member of `room_id`.
    ///
    /// Unknown rooms and solitary senders are silent no-ops; routing never
    /// errors back to the sender. A member whose queue closed since the
    /// last join sweep is skipped, not removed; its own close handler
    /// deregisters it.
    pub async fn route(&self, sender_id: Uuid, room_id: &str, frame: &str) {
        let rooms = self.rooms.lock().await;
        let Some(members) = rooms.get(room_id) else {
            tracing::debug!(room_id, "Dropping frame for unknown room");
            return;
        };
        for member in members {
            if member.id == sender_id {
                continue;
            }
            if member.tx.send(frame.to_string()).is_err() {
                tracing::debug!(member_id = %member.id, room_id, "Skipping member with closed queue");
            }
        }
    }

    /// Remove a connection from its room; delete the room entry when
    /// membership reaches zero. Idempotent: invoked on transport close and
    /// transport error, possibly both.
    pub async fn leave(&self, member_id: Uuid, room_id: &str) {
        let mut rooms = self.rooms.lock().await;
        let Some(members) = rooms.get_mut(room_id) else {
            return;
        };
        let before = members.len();
        members.retain(|m| m.id != member_id);
        if members.len() < before {
            tracing::info!(%member_id, room_id, "Member left room");
        }
        if members.is_empty() {
            rooms.remove(room_id);
            tracing::debug!(room_id, "Room removed (no members left)");
        }
    }

    /// Number of members currently registered under `room_id`.
    pub async fn member_count(&self, room_id: &str) -> usize {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).map(|m| m.len()).unwrap_or(0)
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn member() -> (Uuid, FrameSender, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Uuid::new_v4(), tx, rx)
    }

    #[tokio::test]
    async fn join_acks_the_joiner_only() {
        let registry = RoomRegistry::new();
        let (a, a_tx, mut a_rx) = member();
        let (b, b_tx, mut b_rx) = member();

        registry.join(a, "r1", &a_tx).await;
        registry.join(b, "r1", &b_tx).await;

        assert_eq!(a_rx.recv().await.unwrap(), r#"{"type":"joined","roomId":"r1"}"#);
        assert_eq!(b_rx.recv().await.unwrap(), r#"{"type":"joined","roomId":"r1"}"#);
        // The ack is unicast: the first member sees nothing from b's join
        assert!(a_rx.try_recv().is_err());
        assert_eq!(registry.member_count("r1").await, 2);
    }

    #[tokio::test]
    async fn route_excludes_sender() {
        let registry = RoomRegistry::new();
        let (a, a_tx, mut a_rx) = member();
        let (b, b_tx, mut b_rx) = member();
        registry.join(a, "r1", &a_tx).await;
        registry.join(b, "r1", &b_tx).await;
        a_rx.recv().await.unwrap();
        b_rx.recv().await.unwrap();

        registry.route(a, "r1", "frame-1").await;

        assert_eq!(b_rx.recv().await.unwrap(), "frame-1");
        assert!(a_rx.try_recv().is_err(), "sender must not receive its own frame");
    }

    #[tokio::test]
    async fn route_never_crosses_rooms() {
        let registry = RoomRegistry::new();
        let (a, a_tx, mut a_rx) = member();
        let (b, b_tx, mut b_rx) = member();
        let (c, c_tx, mut c_rx) = member();
        registry.join(a, "r1", &a_tx).await;
        registry.join(b, "r1", &b_tx).await;
        registry.join(c, "r2", &c_tx).await;
        a_rx.recv().await.unwrap();
        b_rx.recv().await.unwrap();
        c_rx.recv().await.unwrap();

        registry.route(a, "r1", "only-for-r1").await;

        assert_eq!(b_rx.recv().await.unwrap(), "only-for-r1");
        assert!(c_rx.try_recv().is_err(), "other rooms must not see the frame");
    }

    #[tokio::test]
    async fn route_to_unknown_room_is_silent() {
        let registry = RoomRegistry::new();
        let (a, _a_tx, _a_rx) = member();
        // Never errors back, just completes
        registry.route(a, "nope", "frame").await;
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn offer_answer_relay_scenario() {
        let registry = RoomRegistry::new();
        let (publisher, pub_tx, mut pub_rx) = member();
        let (viewer, view_tx, mut view_rx) = member();
        registry.join(publisher, "abc123", &pub_tx).await;
        registry.join(viewer, "abc123", &view_tx).await;
        pub_rx.recv().await.unwrap();
        view_rx.recv().await.unwrap();

        let offer = r#"{"type":"offer","roomId":"abc123","sdp":"O1"}"#;
        registry.route(publisher, "abc123", offer).await;
        // Delivered byte-for-byte, only to the viewer
        assert_eq!(view_rx.recv().await.unwrap(), offer);
        assert!(pub_rx.try_recv().is_err());

        let answer = r#"{"type":"answer","roomId":"abc123","sdp":"A1"}"#;
        registry.route(viewer, "abc123", answer).await;
        assert_eq!(pub_rx.recv().await.unwrap(), answer);
        assert!(view_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fan_out_preserves_order() {
        let registry = RoomRegistry::new();
        let (a, a_tx, _a_rx) = member();
        let (b, b_tx, mut b_rx) = member();
        registry.join(a, "r1", &a_tx).await;
        registry.join(b, "r1", &b_tx).await;
        b_rx.recv().await.unwrap();

        for i in 0..10 {
            registry.route(a, "r1", &format!("frame-{i}")).await;
        }
        for i in 0..10 {
            assert_eq!(b_rx.recv().await.unwrap(), format!("frame-{i}"));
        }
    }

    #[tokio::test]
    async fn leave_removes_empty_room_entirely() {
        let registry = RoomRegistry::new();
        let (a, a_tx, _a_rx) = member();
        registry.join(a, "r1", &a_tx).await;
        assert_eq!(registry.room_count().await, 1);

        registry.leave(a, "r1").await;
        // Absent, not merely empty
        assert_eq!(registry.room_count().await, 0);
        assert_eq!(registry.member_count("r1").await, 0);
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let registry = RoomRegistry::new();
        let (a, a_tx, _a_rx) = member();
        let (b, b_tx, _b_rx) = member();
        registry.join(a, "r1", &a_tx).await;
        registry.join(b, "r1", &b_tx).await;

        registry.leave(a, "r1").await;
        registry.leave(a, "r1").await;
        registry.leave(a, "r1").await;

        assert_eq!(registry.member_count("r1").await, 1);
    }

    #[tokio::test]
    async fn membership_tracks_joins_minus_leaves() {
        let registry = RoomRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..5 {
            let (id, tx, rx) = member();
            registry.join(id, "r1", &tx).await;
            handles.push((id, tx, rx));
        }
        assert_eq!(registry.member_count("r1").await, 5);

        for (id, _, _) in handles.iter().take(3) {
            registry.leave(*id, "r1").await;
        }
        assert_eq!(registry.member_count("r1").await, 2);
    }

    #[tokio::test]
    async fn stale_socket_evicted_on_rejoin() {
        let registry = RoomRegistry::new();
        let (stale, stale_tx, stale_rx) = member();
        registry.join(stale, "r1", &stale_tx).await;
        // Socket dies without a leave: the receiving side is dropped
        drop(stale_rx);

        let (fresh, fresh_tx, mut fresh_rx) = member();
        registry.join(fresh, "r1", &fresh_tx).await;

        // The stale member was evicted before the new one was added
        assert_eq!(registry.member_count("r1").await, 1);
        assert_eq!(
            fresh_rx.recv().await.unwrap(),
            r#"{"type":"joined","roomId":"r1"}"#
        );
        // Routing from the fresh member reaches nobody (and does not error)
        registry.route(fresh, "r1", "frame").await;
        assert!(fresh_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_join_re_registers_without_duplicating() {
        let registry = RoomRegistry::new();
        let (a, a_tx, mut a_rx) = member();
        registry.join(a, "r1", &a_tx).await;
        registry.join(a, "r1", &a_tx).await;

        assert_eq!(registry.member_count("r1").await, 1);
        // One ack per join
        assert!(a_rx.recv().await.is_some());
        assert!(a_rx.recv().await.is_some());
        assert!(a_rx.try_recv().is_err());
    }
}
