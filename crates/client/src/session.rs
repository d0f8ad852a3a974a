use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vantage_protocol::{Envelope, TELEMETRY_CHANNEL_LABEL};
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::track::track_remote::TrackRemote;

use crate::media::MediaSource;
use crate::metrics::MetricsSink;
use crate::peer::{IceServerConfig, Peer};
use crate::signaling;
use crate::telemetry;

/// Which side of the pairing this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publisher,
    Viewer,
}

/// Session lifecycle states. `Destroyed` is terminal and reachable from
/// every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Joining,
    Negotiating,
    Connected,
    DisconnectedPending,
    Destroyed,
}

/// Everything that can drive a state transition. Callbacks from the peer
/// transport, the signaling socket and the timers all funnel through one
/// queue, so no transition ever runs concurrently with another.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Signal(Envelope),
    SignalingLost { error: bool },
    PeerState(RTCPeerConnectionState),
    IceState(RTCIceConnectionState),
    TelemetryOpen,
    TelemetryClosed,
    GraceExpired,
    Leave,
}

/// Failures surfaced from [`Session::start`]. Once `start` has returned
/// `Ok`, nothing is ever re-thrown to the host; every later failure is
/// converted into a teardown.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("local media unavailable: {0}")]
    DeviceUnavailable(anyhow::Error),
    #[error("peer transport setup failed: {0}")]
    Peer(anyhow::Error),
    #[error("signaling connection failed: {0}")]
    Signaling(anyhow::Error),
}

/// Session parameters. Grace period and telemetry cadence default to the
/// deployed constants (4 s, 1 s) but stay tunable.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server_url: String,
    pub room_id: String,
    pub role: Role,
    pub grace_period: Duration,
    pub telemetry_interval: Duration,
    pub ice_servers: Vec<IceServerConfig>,
}

impl SessionConfig {
    pub fn new(server_url: impl Into<String>, room_id: impl Into<String>, role: Role) -> Self {
        let defaults = vantage_protocol::SessionConfig::default();
        Self {
            server_url: server_url.into(),
            room_id: room_id.into(),
            role,
            grace_period: Duration::from_millis(defaults.grace_period_ms),
            telemetry_interval: Duration::from_millis(defaults.telemetry_interval_ms),
            ice_servers: Vec::new(),
        }
    }
}

/// Hand-off point to the rendering/detection collaborator: invoked once per
/// session with the first remote track.
pub type RemoteTrackCallback = Arc<dyn Fn(Arc<TrackRemote>) + Send + Sync>;

/// Every resource a session owns, released exactly once by `release_all`.
pub(crate) struct SessionResources {
    pub(crate) telemetry_task: Option<JoinHandle<()>>,
    pub(crate) telemetry_channel: Option<Arc<RTCDataChannel>>,
    pub(crate) media: Option<Box<dyn MediaSource>>,
    pub(crate) peer: Option<Peer>,
    pub(crate) signaling_task: Option<JoinHandle<()>>,
    pub(crate) grace_task: Option<JoinHandle<()>>,
}

impl SessionResources {
    pub(crate) fn empty() -> Self {
        Self {
            telemetry_task: None,
            telemetry_channel: None,
            media: None,
            peer: None,
            signaling_task: None,
            grace_task: None,
        }
    }

    /// Best-effort release of every held resource, in a fixed order:
    /// telemetry timer, telemetry channel, capture tracks, peer transport,
    /// signaling task, grace timer. Each step attempts, logs its own
    /// failure, and continues, so one failing step never blocks the rest, and
    /// a second call finds every handle already taken.
    pub(crate) async fn release_all(&mut self) {
        if let Some(task) = self.telemetry_task.take() {
            task.abort();
            debug!("Telemetry emitter stopped");
        }
        if let Some(dc) = self.telemetry_channel.take()
            && let Err(e) = dc.close().await
        {
            debug!("Telemetry channel close failed: {e}");
        }
        if let Some(mut media) = self.media.take()
            && let Err(e) = media.stop().await
        {
            warn!("Media source stop failed: {e:#}");
        }
        if let Some(peer) = self.peer.take()
            && let Err(e) = peer.close().await
        {
            debug!("Peer close failed: {e:#}");
        }
        if let Some(task) = self.signaling_task.take() {
            task.abort();
            debug!("Signaling task stopped");
        }
        if let Some(task) = self.grace_task.take() {
            task.abort();
            debug!("Grace timer cleared");
        }
    }
}

struct Controller {
    config: SessionConfig,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    outbound: Option<mpsc::UnboundedSender<Envelope>>,
    resources: SessionResources,
    destroyed: Arc<AtomicBool>,
}

impl Controller {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        self.set_state(SessionState::Joining);
        while let Some(event) = events.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }
        // Event queue gone without a terminal trigger: treat as leave
        self.teardown().await;
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        debug!(from = ?self.state, to = ?next, "Session state changed");
        self.state = next;
        let _ = self.state_tx.send(next);
    }

    fn send_envelope(&self, envelope: Envelope) {
        if let Some(tx) = &self.outbound {
            let _ = tx.send(envelope);
        }
    }

    /// Apply one event. Returns `false` once the session is destroyed.
    async fn handle_event(&mut self, event: SessionEvent) -> bool {
        if self.state == SessionState::Destroyed {
            return false;
        }
        match event {
            SessionEvent::Signal(envelope) => self.handle_signal(envelope).await,
            SessionEvent::SignalingLost { error } => {
                if error {
                    warn!("Signaling transport lost");
                } else {
                    info!("Signaling transport closed");
                }
                self.teardown().await;
            }
            SessionEvent::PeerState(state) => match state {
                RTCPeerConnectionState::Connected => {
                    self.disarm_grace_timer();
                    self.set_state(SessionState::Connected);
                }
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                    info!(?state, "Peer transport reached terminal state");
                    self.teardown().await;
                }
                _ => {
                    debug!(?state, "Peer transport state changed");
                }
            },
            SessionEvent::IceState(state) => {
                if state == RTCIceConnectionState::Disconnected {
                    if self.state == SessionState::Connected {
                        self.arm_grace_timer();
                        self.set_state(SessionState::DisconnectedPending);
                    }
                    // Already pending: the existing timer keeps running
                } else {
                    // Any other reachability state cancels the pending teardown
                    self.disarm_grace_timer();
                    if self.state == SessionState::DisconnectedPending {
                        info!("Peer reachability recovered within grace window");
                        self.set_state(SessionState::Connected);
                    }
                }
            }
            SessionEvent::GraceExpired => {
                if self.state == SessionState::DisconnectedPending {
                    info!("Grace period expired without recovery");
                    self.teardown().await;
                }
            }
            SessionEvent::TelemetryOpen => {
                if self.resources.telemetry_task.is_none()
                    && let Some(dc) = self.resources.telemetry_channel.as_ref()
                {
                    info!("Telemetry channel open, starting pings");
                    self.resources.telemetry_task = Some(telemetry::spawn_ping_emitter(
                        Arc::clone(dc),
                        self.config.telemetry_interval,
                    ));
                }
            }
            SessionEvent::TelemetryClosed => {
                if let Some(task) = self.resources.telemetry_task.take() {
                    task.abort();
                    debug!("Telemetry channel closed, pings stopped");
                }
            }
            SessionEvent::Leave => {
                info!("Leave requested");
                self.teardown().await;
            }
        }
        self.state != SessionState::Destroyed
    }

    async fn handle_signal(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Joined { room_id } => {
                debug!(room_id, "Join acknowledged");
                if self.state == SessionState::Joining {
                    self.set_state(SessionState::Negotiating);
                }
            }
            Envelope::Offer { sdp, .. } => {
                if self.config.role != Role::Viewer {
                    debug!("Publisher ignoring inbound offer");
                    return;
                }
                if self.state == SessionState::Joining {
                    self.set_state(SessionState::Negotiating);
                }
                let answered = match self.resources.peer.as_ref() {
                    Some(peer) => peer.answer_offer(&sdp).await,
                    None => return,
                };
                match answered {
                    Ok(answer_sdp) => {
                        self.send_envelope(Envelope::Answer {
                            room_id: self.config.room_id.clone(),
                            sdp: answer_sdp,
                        });
                    }
                    Err(e) => {
                        warn!("Failed to answer offer: {e:#}");
                        self.teardown().await;
                    }
                }
            }
            Envelope::Answer { sdp, .. } => {
                if self.config.role != Role::Publisher {
                    debug!("Viewer ignoring inbound answer");
                    return;
                }
                let applied = match self.resources.peer.as_ref() {
                    Some(peer) => peer.apply_answer(&sdp).await,
                    None => return,
                };
                if let Err(e) = applied {
                    warn!("Failed to apply answer: {e:#}");
                    self.teardown().await;
                }
            }
            Envelope::Ice { candidate, .. } => {
                // A rejected candidate must not abort the session
                let applied = match self.resources.peer.as_ref() {
                    Some(peer) => peer.add_remote_candidate(&candidate).await,
                    None => return,
                };
                if let Err(e) = applied {
                    debug!("Discarding ICE candidate: {e:#}");
                }
            }
            Envelope::Join { .. } => {
                debug!("Ignoring join envelope from peer");
            }
        }
    }

    /// Arm the single grace timer. A second `disconnected` while one is
    /// pending must not create another.
    fn arm_grace_timer(&mut self) {
        if self.resources.grace_task.is_some() {
            return;
        }
        let events = self.events_tx.clone();
        let grace = self.config.grace_period;
        self.resources.grace_task = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = events.send(SessionEvent::GraceExpired);
        }));
        debug!(grace_ms = grace.as_millis() as u64, "Grace timer armed");
    }

    fn disarm_grace_timer(&mut self) {
        if let Some(task) = self.resources.grace_task.take() {
            task.abort();
            debug!("Grace timer cleared");
        }
    }

    /// One-shot teardown. Every terminal trigger funnels here; repeats are
    /// no-ops, and no cleanup failure ever propagates.
    async fn teardown(&mut self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Tearing down session");
        // Dropping the outbound queue lets the signaling task close the socket
        self.outbound = None;
        self.resources.release_all().await;
        self.set_state(SessionState::Destroyed);
    }
}

/// A running session.
///
/// Dropping the handle does not tear the session down; call
/// [`SessionHandle::leave`]. Both `leave` and a second teardown trigger are
/// harmless after destruction.
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Ask the session to tear down.
    pub fn leave(&self) {
        let _ = self.events.send(SessionEvent::Leave);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Wait until the session reaches `Destroyed`.
    pub async fn closed(&mut self) {
        while *self.state_rx.borrow() != SessionState::Destroyed {
            if self.state_rx.changed().await.is_err() {
                break;
            }
        }
    }
}

pub struct Session;

impl Session {
    /// Acquire resources and launch a session.
    ///
    /// The publisher path opens `media` first: if the device is unavailable
    /// the error surfaces here and no partial session exists. After `Ok`,
    /// the returned handle is the host's only control surface; every
    /// failure from here on resolves into a teardown instead of an error.
    pub async fn start(
        config: SessionConfig,
        mut media: Option<Box<dyn MediaSource>>,
        on_remote_track: Option<RemoteTrackCallback>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Result<SessionHandle, StartError> {
        let mut tracks = Vec::new();
        if config.role == Role::Publisher {
            let source = media.as_mut().ok_or_else(|| {
                StartError::DeviceUnavailable(anyhow::anyhow!(
                    "publisher role requires a media source"
                ))
            })?;
            tracks = source.open().await.map_err(StartError::DeviceUnavailable)?;
        }

        let peer = match Peer::new(config.ice_servers.clone()).await {
            Ok(peer) => peer,
            Err(e) => {
                release_partial(None, media).await;
                return Err(StartError::Peer(e));
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let destroyed = Arc::new(AtomicBool::new(false));

        // Transport observations funnel into the event queue
        let tx = events_tx.clone();
        peer.on_connection_state_change(move |state| {
            let _ = tx.send(SessionEvent::PeerState(state));
        });
        let tx = events_tx.clone();
        peer.on_ice_connection_state_change(move |state| {
            let _ = tx.send(SessionEvent::IceState(state));
        });

        // Locally discovered candidates go out immediately
        let ice_out = outbound_tx.clone();
        let ice_room = config.room_id.clone();
        let guard = Arc::clone(&destroyed);
        peer.on_ice_candidate(move |candidate| {
            if guard.load(Ordering::SeqCst) {
                return;
            }
            let _ = ice_out.send(Envelope::Ice {
                room_id: ice_room.clone(),
                candidate,
            });
        });

        // Remote media hand-off, once per session
        if let Some(callback) = on_remote_track {
            let first = AtomicBool::new(false);
            let guard = Arc::clone(&destroyed);
            peer.on_track(move |track| {
                if guard.load(Ordering::SeqCst) || first.swap(true, Ordering::SeqCst) {
                    return;
                }
                info!(kind = %track.kind(), "Remote track attached");
                callback(track);
            });
        }

        // Role-specific wiring
        let mut telemetry_channel = None;
        match config.role {
            Role::Publisher => {
                for track in tracks {
                    if let Err(e) = peer.add_track(track).await {
                        release_partial(Some(peer), media).await;
                        return Err(StartError::Peer(e));
                    }
                }
                let dc = match peer.create_data_channel(TELEMETRY_CHANNEL_LABEL).await {
                    Ok(dc) => dc,
                    Err(e) => {
                        release_partial(Some(peer), media).await;
                        return Err(StartError::Peer(e));
                    }
                };
                let tx = events_tx.clone();
                dc.on_open(Box::new(move || {
                    let _ = tx.send(SessionEvent::TelemetryOpen);
                    Box::pin(async {})
                }));
                let tx = events_tx.clone();
                dc.on_close(Box::new(move || {
                    let _ = tx.send(SessionEvent::TelemetryClosed);
                    Box::pin(async {})
                }));
                telemetry_channel = Some(dc);
            }
            Role::Viewer => {
                if let Some(sink) = metrics {
                    let guard = Arc::clone(&destroyed);
                    peer.on_data_channel(move |dc| {
                        if dc.label() == TELEMETRY_CHANNEL_LABEL {
                            info!("Telemetry channel received");
                            telemetry::attach_viewer_consumer(
                                &dc,
                                Arc::clone(&sink),
                                Arc::clone(&guard),
                            );
                        }
                    });
                }
            }
        }

        let ws = match signaling::connect(&config.server_url).await {
            Ok(ws) => ws,
            Err(e) => {
                release_partial(Some(peer), media).await;
                return Err(StartError::Signaling(e));
            }
        };
        let signaling_task = signaling::spawn_signaling_task(ws, events_tx.clone(), outbound_rx);

        // Idle → Joining: register in the room, then kick off negotiation
        let _ = outbound_tx.send(Envelope::Join {
            room_id: config.room_id.clone(),
        });
        if config.role == Role::Publisher {
            match peer.create_offer_sdp().await {
                Ok(sdp) => {
                    let _ = outbound_tx.send(Envelope::Offer {
                        room_id: config.room_id.clone(),
                        sdp,
                    });
                }
                Err(e) => {
                    signaling_task.abort();
                    release_partial(Some(peer), media).await;
                    return Err(StartError::Peer(e));
                }
            }
        }

        let mut resources = SessionResources::empty();
        resources.telemetry_channel = telemetry_channel;
        resources.media = media;
        resources.peer = Some(peer);
        resources.signaling_task = Some(signaling_task);

        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let controller = Controller {
            config,
            state: SessionState::Idle,
            state_tx,
            events_tx: events_tx.clone(),
            outbound: Some(outbound_tx),
            resources,
            destroyed,
        };
        tokio::spawn(controller.run(events_rx));

        Ok(SessionHandle {
            events: events_tx,
            state_rx,
        })
    }
}

/// Undo a half-finished start. Only resources acquired so far exist, so
/// there is no session to tear down, only handles to release.
async fn release_partial(peer: Option<Peer>, media: Option<Box<dyn MediaSource>>) {
    if let Some(peer) = peer
        && let Err(e) = peer.close().await
    {
        debug!("Peer close failed during aborted start: {e:#}");
    }
    if let Some(mut media) = media
        && let Err(e) = media.stop().await
    {
        warn!("Media source stop failed during aborted start: {e:#}");
    }
}
