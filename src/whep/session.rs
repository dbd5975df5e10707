//! WHEP session negotiation
//!
//! One session performs exactly one offer/answer exchange:
//!
//! ```text
//! New -> OfferCreated -> GatheringCandidates -> Negotiating -> Connected -> Closed
//!   \____________\_______________\__________________\-> Failed
//! ```

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::http::WhepSignaling;
use crate::config::WhepConfig;
use crate::error::{AppError, Result};
use crate::webrtc::signaling::is_session_description;
use crate::webrtc::{ConnectionState, RemoteTrack, TransportEngine, VideoCapability, VideoCodec};

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    New,
    OfferCreated,
    GatheringCandidates,
    Negotiating,
    Connected,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Transitions are linear and single-shot
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (*self, next) {
            (New, OfferCreated)
            | (OfferCreated, GatheringCandidates)
            | (GatheringCandidates, Negotiating)
            | (Negotiating, Connected) => true,
            (from, Failed) => !from.is_terminal(),
            (from, Closed) => from != Closed,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::New => write!(f, "new"),
            SessionState::OfferCreated => write!(f, "offer_created"),
            SessionState::GatheringCandidates => write!(f, "gathering_candidates"),
            SessionState::Negotiating => write!(f, "negotiating"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// A WHEP viewer session owning its transport connection
pub struct WhepSession {
    id: String,
    config: WhepConfig,
    signaling: WhepSignaling,
    transport: Box<dyn TransportEngine>,
    state: watch::Sender<SessionState>,
    codec: Option<VideoCodec>,
    resource_url: Option<Url>,
    cancel: CancellationToken,
}

impl WhepSession {
    pub fn new(
        id: impl Into<String>,
        config: WhepConfig,
        transport: Box<dyn TransportEngine>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let signaling = WhepSignaling::new(&config)?;
        let (state, _) = watch::channel(SessionState::New);

        Ok(Self {
            id: id.into(),
            config,
            signaling,
            transport,
            state,
            codec: None,
            resource_url: None,
            cancel,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to session state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Codec negotiated by `negotiate`
    pub fn codec(&self) -> Option<VideoCodec> {
        self.codec
    }

    /// Session resource announced by the server
    pub fn resource_url(&self) -> Option<&Url> {
        self.resource_url.as_ref()
    }

    /// Take the "new remote track" event queue (only once)
    pub fn take_track_events(&mut self) -> Option<mpsc::Receiver<RemoteTrack>> {
        self.transport.take_track_events()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.transport.connection_state()
    }

    fn transition(&self, to: SessionState) -> Result<()> {
        let from = self.state();
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidState { from, to });
        }
        self.state.send_replace(to);
        debug!("Session {} state: {} -> {}", self.id, from, to);
        Ok(())
    }

    /// Run the offer/answer exchange against `url`
    ///
    /// Any failure leaves the session `Failed`; it is not retried.
    pub async fn negotiate(&mut self, url: &str, codec: &str) -> Result<()> {
        let current = self.state();
        if current != SessionState::New {
            return Err(AppError::InvalidState {
                from: current,
                to: SessionState::OfferCreated,
            });
        }

        let cancel = self.cancel.clone();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = self.run_negotiation(url, codec) => result,
        };

        match result {
            Ok(()) => {
                info!(
                    "Session {} connected to {} via {} ({})",
                    self.id,
                    url,
                    self.transport.name(),
                    self.codec.map(|c| c.display_name()).unwrap_or("unknown")
                );
                Ok(())
            }
            Err(e) => {
                error!("Session {} negotiation failed: {}", self.id, e);
                if !self.state().is_terminal() {
                    self.state.send_replace(SessionState::Failed);
                }
                Err(e)
            }
        }
    }

    async fn run_negotiation(&mut self, url: &str, codec: &str) -> Result<()> {
        let codec: VideoCodec = codec.parse()?;
        let url = Url::parse(url)
            .map_err(|e| AppError::Config(format!("Invalid WHEP URL {}: {}", url, e)))?;

        let capability = VideoCapability::for_codec(codec);
        self.transport.configure(&capability).await?;
        self.codec = Some(codec);

        let offer = self.transport.create_offer().await?;
        self.transition(SessionState::OfferCreated)?;

        self.transport.set_local_description(&offer).await?;
        self.transition(SessionState::GatheringCandidates)?;

        let timeout = self.config.gathering_timeout();
        tokio::time::timeout(timeout, self.transport.wait_gathering_complete())
            .await
            .map_err(|_| AppError::GatheringTimeout(timeout))??;

        let local = self.transport.local_description().await?;
        self.transition(SessionState::Negotiating)?;

        let answer = self.signaling.post_offer(&url, &local).await?;
        info!(
            "Session {} offer accepted ({}), resource: {}",
            self.id,
            answer.status,
            answer
                .resource_url
                .as_ref()
                .map(Url::as_str)
                .unwrap_or("none")
        );
        // Needed for DELETE even if the answer turns out unusable
        self.resource_url = answer.resource_url;

        if !is_session_description(&answer.sdp) {
            return Err(AppError::InvalidAnswer(
                "response body is not a session description".to_string(),
            ));
        }
        self.transport.set_remote_description(&answer.sdp).await?;

        self.transition(SessionState::Connected)
    }

    /// Release the transport and the server-side resource
    ///
    /// Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Ok(());
        }

        if let Some(resource) = self.resource_url.take() {
            match self.signaling.delete_resource(&resource).await {
                Ok(status) if status.is_success() => {
                    debug!("Session {} resource {} deleted", self.id, resource);
                }
                Ok(status) => {
                    warn!("Session {} DELETE {} returned {}", self.id, resource, status);
                }
                Err(e) => {
                    warn!("Session {} DELETE {} failed: {}", self.id, resource, e);
                }
            }
        }

        let result = self.transport.close().await;
        self.transition(SessionState::Closed)?;
        info!("Session {} closed", self.id);
        result
    }
}
