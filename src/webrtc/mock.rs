//! In-process transport engine for tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::signaling::ConnectionState;
use super::transport::{RemoteTrack, TransportEngine, VideoCapability, TRACK_EVENT_CAPACITY};
use crate::error::{AppError, Result};

pub const MOCK_OFFER: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\n";
pub const MOCK_CANDIDATE: &str = "a=candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host\r\n";

/// Test-side view of a [`MockTransport`]
#[derive(Clone)]
pub struct MockHandle {
    pub track_tx: mpsc::Sender<RemoteTrack>,
    pub state: Arc<watch::Sender<ConnectionState>>,
    pub capability: Arc<Mutex<Option<VideoCapability>>>,
    pub remote_description: Arc<Mutex<Option<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockHandle {
    pub fn remote_description(&self) -> Option<String> {
        self.remote_description.lock().unwrap().clone()
    }

    pub fn capability(&self) -> Option<VideoCapability> {
        self.capability.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockTransport {
    gathering_completes: bool,
    local: Option<String>,
    track_rx: Option<mpsc::Receiver<RemoteTrack>>,
    state_rx: watch::Receiver<ConnectionState>,
    handle: MockHandle,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        Self::build(true)
    }

    /// Gathering never reports completion
    pub fn stalled() -> (Self, MockHandle) {
        Self::build(false)
    }

    fn build(gathering_completes: bool) -> (Self, MockHandle) {
        let (track_tx, track_rx) = mpsc::channel(TRACK_EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::New);
        let handle = MockHandle {
            track_tx,
            state: Arc::new(state_tx),
            capability: Arc::new(Mutex::new(None)),
            remote_description: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let transport = Self {
            gathering_completes,
            local: None,
            track_rx: Some(track_rx),
            state_rx,
            handle: handle.clone(),
        };
        (transport, handle)
    }
}

#[async_trait]
impl TransportEngine for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn configure(&mut self, capability: &VideoCapability) -> Result<()> {
        *self.handle.capability.lock().unwrap() = Some(capability.clone());
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<String> {
        Ok(MOCK_OFFER.to_string())
    }

    async fn set_local_description(&mut self, offer: &str) -> Result<()> {
        self.local = Some(offer.to_string());
        Ok(())
    }

    async fn wait_gathering_complete(&mut self) -> Result<()> {
        if !self.gathering_completes {
            std::future::pending::<()>().await;
        }
        if let Some(local) = self.local.as_mut() {
            local.push_str(MOCK_CANDIDATE);
        }
        Ok(())
    }

    async fn local_description(&self) -> Result<String> {
        self.local
            .clone()
            .ok_or_else(|| AppError::WebRtcError("No local description".to_string()))
    }

    async fn set_remote_description(&mut self, answer: &str) -> Result<()> {
        *self.handle.remote_description.lock().unwrap() = Some(answer.to_string());
        let _ = self.handle.state.send(ConnectionState::Connected);
        Ok(())
    }

    fn take_track_events(&mut self) -> Option<mpsc::Receiver<RemoteTrack>> {
        self.track_rx.take()
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    async fn close(&mut self) -> Result<()> {
        self.handle.closed.store(true, Ordering::SeqCst);
        let _ = self.handle.state.send(ConnectionState::Closed);
        Ok(())
    }
}
