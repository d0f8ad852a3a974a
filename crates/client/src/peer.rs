use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};
use vantage_protocol::CandidateInit;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// ICE server entry for the peer transport.
#[derive(Debug, Clone, Default)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Thin wrapper around the WebRTC peer transport.
///
/// All codecs are registered by default; which codec actually flows is the
/// media source's decision, not the transport's.
pub struct Peer {
    peer_connection: Arc<RTCPeerConnection>,
}

impl Peer {
    pub async fn new(ice_servers: Vec<IceServerConfig>) -> anyhow::Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .context("Failed to register codecs")?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_ice_servers: Vec<RTCIceServer> = if ice_servers.is_empty() {
            vec![RTCIceServer {
                urls: vec![
                    "stun:stun.l.google.com:19302".to_string(),
                    "stun:stun1.l.google.com:19302".to_string(),
                ],
                ..Default::default()
            }]
        } else {
            ice_servers
                .into_iter()
                .map(|s| RTCIceServer {
                    urls: s.urls,
                    username: s.username.unwrap_or_default(),
                    credential: s.credential.unwrap_or_default(),
                })
                .collect()
        };

        let config = RTCConfiguration {
            ice_servers: rtc_ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(config).await?);
        info!("Peer connection created");

        Ok(Self { peer_connection })
    }

    /// Publisher path: build the local offer and install it.
    pub async fn create_offer_sdp(&self) -> anyhow::Result<String> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .context("Failed to create offer")?;
        let sdp = offer.sdp.clone();
        self.peer_connection
            .set_local_description(offer)
            .await
            .context("Failed to set local description")?;
        Ok(sdp)
    }

    /// Viewer path: apply a remote offer, produce and install the answer.
    pub async fn answer_offer(&self, sdp: &str) -> anyhow::Result<String> {
        let offer =
            RTCSessionDescription::offer(sdp.to_string()).context("Failed to parse SDP offer")?;
        self.peer_connection
            .set_remote_description(offer)
            .await
            .context("Failed to set remote description")?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .context("Failed to create answer")?;
        let answer_sdp = answer.sdp.clone();
        self.peer_connection
            .set_local_description(answer)
            .await
            .context("Failed to set local description")?;
        Ok(answer_sdp)
    }

    /// Publisher path: apply the viewer's answer as the remote description.
    pub async fn apply_answer(&self, sdp: &str) -> anyhow::Result<()> {
        let answer =
            RTCSessionDescription::answer(sdp.to_string()).context("Failed to parse SDP answer")?;
        self.peer_connection
            .set_remote_description(answer)
            .await
            .context("Failed to set remote description")
    }

    pub async fn add_remote_candidate(&self, candidate: &CandidateInit) -> anyhow::Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            ..Default::default()
        };

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .context("Failed to add ICE candidate")?;

        debug!(candidate = %candidate.candidate, "ICE candidate added");
        Ok(())
    }

    pub async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> anyhow::Result<()> {
        self.peer_connection
            .add_track(track)
            .await
            .context("Failed to add local track")?;
        Ok(())
    }

    pub async fn create_data_channel(&self, label: &str) -> anyhow::Result<Arc<RTCDataChannel>> {
        self.peer_connection
            .create_data_channel(label, None)
            .await
            .context("Failed to create data channel")
    }

    pub fn on_ice_candidate(&self, callback: impl Fn(CandidateInit) + Send + Sync + 'static) {
        let callback = Arc::new(callback);
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                if let Some(c) = candidate {
                    match c.to_json() {
                        Ok(json) => {
                            let cb = Arc::clone(&callback);
                            cb(CandidateInit {
                                candidate: json.candidate,
                                sdp_mid: json.sdp_mid,
                                sdp_mline_index: json.sdp_mline_index,
                            });
                        }
                        Err(e) => {
                            tracing::warn!("Failed to serialize ICE candidate: {e}");
                        }
                    }
                }
                Box::pin(async {})
            }));
    }

    pub fn on_track(&self, callback: impl Fn(Arc<TrackRemote>) + Send + Sync + 'static) {
        let callback = Arc::new(callback);
        self.peer_connection
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let cb = Arc::clone(&callback);
                cb(track);
                Box::pin(async {})
            }));
    }

    pub fn on_connection_state_change(
        &self,
        callback: impl Fn(RTCPeerConnectionState) + Send + Sync + 'static,
    ) {
        let callback = Arc::new(callback);
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |state| {
                let cb = Arc::clone(&callback);
                cb(state);
                Box::pin(async {})
            }));
    }

    pub fn on_ice_connection_state_change(
        &self,
        callback: impl Fn(RTCIceConnectionState) + Send + Sync + 'static,
    ) {
        let callback = Arc::new(callback);
        self.peer_connection
            .on_ice_connection_state_change(Box::new(move |state| {
                let cb = Arc::clone(&callback);
                cb(state);
                Box::pin(async {})
            }));
    }

    pub fn on_data_channel(&self, callback: impl Fn(Arc<RTCDataChannel>) + Send + Sync + 'static) {
        let callback = Arc::new(callback);
        self.peer_connection.on_data_channel(Box::new(move |dc| {
            let cb = Arc::clone(&callback);
            cb(dc);
            Box::pin(async {})
        }));
    }

    /// Current peer transport connection state.
    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.peer_connection.connection_state()
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        self.peer_connection
            .close()
            .await
            .context("Failed to close peer connection")?;
        info!("Peer connection closed");
        Ok(())
    }
}
