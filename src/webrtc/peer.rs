//! webrtc-rs implementation of the transport engine

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use super::config::WebRtcConfig;
use super::signaling::ConnectionState;
use super::transport::{
    RemoteTrack, TrackInfo, TransportEngine, VideoCapability, PACKET_QUEUE_CAPACITY,
    TRACK_EVENT_CAPACITY,
};
use crate::error::{AppError, Result};

/// Receive-only peer connection backed by webrtc-rs
pub struct WebRtcTransport {
    /// Session ID (for logging)
    session_id: String,
    config: WebRtcConfig,
    /// WebRTC peer connection, created by `configure`
    pc: Option<Arc<RTCPeerConnection>>,
    /// Gathering-complete promise, armed before the local description is set
    gather_complete: Option<mpsc::Receiver<()>>,
    track_tx: mpsc::Sender<RemoteTrack>,
    track_rx: Option<mpsc::Receiver<RemoteTrack>>,
    /// Connection state
    state: Arc<watch::Sender<ConnectionState>>,
    /// State receiver
    state_rx: watch::Receiver<ConnectionState>,
}

impl WebRtcTransport {
    pub fn new(config: WebRtcConfig, session_id: impl Into<String>) -> Self {
        let (track_tx, track_rx) = mpsc::channel(TRACK_EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::New);

        Self {
            session_id: session_id.into(),
            config,
            pc: None,
            gather_complete: None,
            track_tx,
            track_rx: Some(track_rx),
            state: Arc::new(state_tx),
            state_rx,
        }
    }

    fn pc(&self) -> Result<&Arc<RTCPeerConnection>> {
        self.pc
            .as_ref()
            .ok_or_else(|| AppError::WebRtcError("Peer connection not configured".to_string()))
    }

    /// Set up peer connection event handlers
    fn setup_event_handlers(&self, pc: &Arc<RTCPeerConnection>) {
        let state = self.state.clone();
        let session_id = self.session_id.clone();

        // Connection state change handler
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let state = state.clone();
            let session_id = session_id.clone();

            Box::pin(async move {
                if let Some(new_state) = ConnectionState::from_rtc(s) {
                    info!("Session {} peer connection state: {}", session_id, new_state);
                    let _ = state.send(new_state);
                }
            })
        }));

        // ICE connection state handler
        let session_id_ice = self.session_id.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let session_id = session_id_ice.clone();
            Box::pin(async move {
                info!("[ICE] Session {} connection state: {:?}", session_id, state);
            })
        }));

        // ICE gathering state handler
        let session_id_gather = self.session_id.clone();
        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            let session_id = session_id_gather.clone();
            Box::pin(async move {
                debug!("[ICE] Session {} gathering state: {:?}", session_id, state);
            })
        }));

        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            Box::pin(async move {
                if let Some(c) = candidate {
                    let candidate_str = c.to_json().map(|j| j.candidate).unwrap_or_default();
                    debug!("ICE candidate: {}", candidate_str);
                }
            })
        }));

        // Remote track handler: one packet pump per track
        let track_tx = self.track_tx.clone();
        let session_id_track = self.session_id.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let track_tx = track_tx.clone();
                let session_id = session_id_track.clone();

                Box::pin(async move {
                    let codec = track.codec();
                    let info = TrackInfo {
                        id: track.id(),
                        mime_type: codec.capability.mime_type.clone(),
                        payload_type: track.payload_type(),
                        clock_rate: codec.capability.clock_rate,
                        ssrc: track.ssrc(),
                    };
                    info!(
                        "[Track] Session {} codec: {} | PayloadType: {}",
                        session_id, info.mime_type, info.payload_type
                    );

                    let (packet_tx, packet_rx) = mpsc::channel(PACKET_QUEUE_CAPACITY);
                    let track_id = info.id.clone();
                    let remote = RemoteTrack {
                        info,
                        packets: packet_rx,
                    };
                    if track_tx.send(remote).await.is_err() {
                        warn!("No track router for session {}, ignoring track {}", session_id, track_id);
                        return;
                    }

                    tokio::spawn(pump_packets(track, packet_tx, track_id));
                })
            },
        ));
    }
}

/// Forward RTP packets from the engine into the track's queue
async fn pump_packets(
    track: Arc<TrackRemote>,
    packet_tx: mpsc::Sender<rtp::packet::Packet>,
    track_id: String,
) {
    let mut forwarded: u64 = 0;
    loop {
        match track.read_rtp().await {
            Ok((packet, _attributes)) => {
                trace!(
                    "Track {} RTP seq={} ts={} len={}",
                    track_id,
                    packet.header.sequence_number,
                    packet.header.timestamp,
                    packet.payload.len()
                );
                if packet_tx.send(packet).await.is_err() {
                    debug!("Track {} consumer gone, stopping packet pump", track_id);
                    break;
                }
                forwarded += 1;
            }
            Err(e) => {
                info!("Track {} read ended: {}", track_id, e);
                break;
            }
        }
    }
    debug!("Track {} packet pump stopped ({} packets)", track_id, forwarded);
}

#[async_trait]
impl TransportEngine for WebRtcTransport {
    fn name(&self) -> &'static str {
        "webrtc-rs"
    }

    async fn configure(&mut self, capability: &VideoCapability) -> Result<()> {
        if self.pc.is_some() {
            return Err(AppError::WebRtcError(
                "Peer connection already configured".to_string(),
            ));
        }

        // Only the preferred codec, so the offer carries exactly one capability
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: RTCRtpCodecCapability {
                        mime_type: capability.mime_type.clone(),
                        clock_rate: capability.clock_rate,
                        channels: 0,
                        sdp_fmtp_line: capability.sdp_fmtp_line.clone(),
                        rtcp_feedback: capability.codec.rtcp_feedback(),
                    },
                    payload_type: capability.payload_type,
                    ..Default::default()
                },
                RTPCodecType::Video,
            )
            .map_err(|e| {
                AppError::WebRtcError(format!("Failed to register {} codec: {}", capability.codec, e))
            })?;

        info!(
            "Registered {} (PT={}) for session {}",
            capability.codec, capability.payload_type, self.session_id
        );

        // Create interceptor registry
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::WebRtcError(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self.config.ice_servers(),
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?;
        let pc = Arc::new(pc);

        pc.add_transceiver_from_kind(
            RTPCodecType::Video,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }),
        )
        .await
        .map_err(|e| AppError::WebRtcError(format!("Failed to add transceiver: {}", e)))?;

        self.setup_event_handlers(&pc);
        self.pc = Some(pc);

        Ok(())
    }

    async fn create_offer(&mut self) -> Result<String> {
        let offer = self
            .pc()?
            .create_offer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create offer: {}", e)))?;
        Ok(offer.sdp)
    }

    async fn set_local_description(&mut self, offer: &str) -> Result<()> {
        let pc = self.pc()?.clone();
        let desc = RTCSessionDescription::offer(offer.to_string())
            .map_err(|e| AppError::WebRtcError(format!("Invalid SDP offer: {}", e)))?;

        // Must be armed before gathering starts
        self.gather_complete = Some(pc.gathering_complete_promise().await);

        pc.set_local_description(desc)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set local description: {}", e)))
    }

    async fn wait_gathering_complete(&mut self) -> Result<()> {
        let mut rx = self.gather_complete.take().ok_or_else(|| {
            AppError::WebRtcError("Local description not set before gathering".to_string())
        })?;
        // The promise resolves by dropping its sender
        let _ = rx.recv().await;
        debug!("[ICE] Session {} gathering complete", self.session_id);
        Ok(())
    }

    async fn local_description(&self) -> Result<String> {
        self.pc()?
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .ok_or_else(|| AppError::WebRtcError("No local description".to_string()))
    }

    async fn set_remote_description(&mut self, answer: &str) -> Result<()> {
        let desc = RTCSessionDescription::answer(answer.to_string())
            .map_err(|e| AppError::InvalidAnswer(e.to_string()))?;

        self.pc()?
            .set_remote_description(desc)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set remote description: {}", e)))
    }

    fn take_track_events(&mut self) -> Option<mpsc::Receiver<RemoteTrack>> {
        self.track_rx.take()
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    async fn close(&mut self) -> Result<()> {
        self.gather_complete = None;
        if let Some(pc) = self.pc.take() {
            pc.close().await.map_err(|e| {
                AppError::WebRtcError(format!("Failed to close peer connection: {}", e))
            })?;
            info!("Session {} peer connection closed", self.session_id);
        }
        let _ = self.state.send(ConnectionState::Closed);
        Ok(())
    }
}
