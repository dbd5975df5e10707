//! Top-level WHEP player client

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::session::{SessionState, WhepSession};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::track::{DecoderReadyCallback, TrackRouter, TrackStats};
use crate::webrtc::{ConnectionState, TrackInfo, TransportEngine, VideoCodec, WebRtcTransport};

/// Negotiates one session and plays its tracks
pub struct WhepClient {
    config: AppConfig,
    session: WhepSession,
    cancel: CancellationToken,
    on_decoder_ready: Option<DecoderReadyCallback>,
    router: Option<JoinHandle<Vec<TrackStats>>>,
}

impl WhepClient {
    /// Create a client backed by webrtc-rs
    pub fn new(config: AppConfig) -> Result<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let transport = WebRtcTransport::new(config.webrtc.clone(), session_id.clone());
        Self::with_transport(config, session_id, Box::new(transport))
    }

    pub fn with_transport(
        config: AppConfig,
        session_id: String,
        transport: Box<dyn TransportEngine>,
    ) -> Result<Self> {
        config.validate()?;
        let cancel = CancellationToken::new();
        let session = WhepSession::new(session_id, config.whep.clone(), transport, cancel.clone())?;

        Ok(Self {
            config,
            session,
            cancel,
            on_decoder_ready: None,
            router: None,
        })
    }

    /// Called once per track when its decoder pipeline is running
    pub fn on_decoder_ready<F>(&mut self, callback: F)
    where
        F: Fn(&TrackInfo, VideoCodec) + Send + Sync + 'static,
    {
        self.on_decoder_ready = Some(Arc::new(callback));
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Negotiate and start routing tracks to playback
    pub async fn connect(&mut self) -> Result<()> {
        let tracks = self.session.take_track_events().ok_or_else(|| {
            AppError::WebRtcError("Track events already taken".to_string())
        })?;

        info!(
            "Session {} connecting to {} (codec {})",
            self.session.id(),
            self.config.whep.endpoint_url,
            self.config.whep.codec
        );
        let url = self.config.whep.endpoint_url.clone();
        let codec = self.config.whep.codec.clone();
        self.session.negotiate(&url, &codec).await?;

        let router = TrackRouter::new(self.config.playback.clone(), self.cancel.clone())
            .with_decoder_ready(self.on_decoder_ready.clone());
        self.router = Some(tokio::spawn(router.run(tracks)));
        Ok(())
    }

    /// Wait until the peer connection fails or closes, or the client is shut down
    pub async fn wait_for_disconnect(&self) -> ConnectionState {
        let mut state = self.session.connection_state();
        loop {
            let current = *state.borrow_and_update();
            if current.is_finished() {
                return current;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return ConnectionState::Closed,
                changed = state.changed() => {
                    if changed.is_err() {
                        return ConnectionState::Closed;
                    }
                }
            }
        }
    }

    /// Stop all tracks and close the session
    pub async fn shutdown(&mut self) -> Result<Vec<TrackStats>> {
        self.cancel.cancel();

        let mut stats = Vec::new();
        if let Some(router) = self.router.take() {
            match router.await {
                Ok(finished) => stats = finished,
                Err(e) => warn!("Track router task failed: {}", e),
            }
        }

        self.session.close().await?;
        Ok(stats)
    }
}
