//! Transport engine capability surface
//!
//! The session negotiator and track router only see this trait. ICE, DTLS/SRTP,
//! RTCP and jitter handling stay inside the implementation.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::codec::VideoCodec;
use super::signaling::ConnectionState;
use crate::error::Result;

/// Capacity of the "new remote track" event queue
pub const TRACK_EVENT_CAPACITY: usize = 8;

/// Capacity of each track's packet queue
pub const PACKET_QUEUE_CAPACITY: usize = 512;

/// The single receive-only video capability registered with the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCapability {
    pub codec: VideoCodec,
    pub mime_type: String,
    pub clock_rate: u32,
    pub payload_type: u8,
    pub sdp_fmtp_line: String,
}

impl VideoCapability {
    pub fn for_codec(codec: VideoCodec) -> Self {
        Self {
            codec,
            mime_type: codec.mime_type().to_string(),
            clock_rate: codec.clock_rate(),
            payload_type: codec.payload_type(),
            sdp_fmtp_line: codec.sdp_fmtp(),
        }
    }
}

/// Negotiated parameters of one remote track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub mime_type: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub ssrc: u32,
}

/// A remote track announced by the engine
///
/// Packets arrive in engine delivery order; the queue closes when the track
/// ends or reading from the transport fails.
pub struct RemoteTrack {
    pub info: TrackInfo,
    pub packets: mpsc::Receiver<rtp::packet::Packet>,
}

/// Transport engine trait
#[async_trait]
pub trait TransportEngine: Send + Sync {
    /// Get engine name
    fn name(&self) -> &'static str;

    /// Create the connection accepting exactly one receive-only video capability
    async fn configure(&mut self, capability: &VideoCapability) -> Result<()>;

    /// Create a local offer (no network I/O)
    async fn create_offer(&mut self) -> Result<String>;

    /// Apply the offer as local description and start candidate gathering
    async fn set_local_description(&mut self, offer: &str) -> Result<()>;

    /// Suspend until candidate gathering has completed
    async fn wait_gathering_complete(&mut self) -> Result<()>;

    /// Local description including gathered candidates
    async fn local_description(&self) -> Result<String>;

    /// Apply the remote answer
    async fn set_remote_description(&mut self, answer: &str) -> Result<()>;

    /// Take the "new remote track" event queue (only once)
    fn take_track_events(&mut self) -> Option<mpsc::Receiver<RemoteTrack>>;

    /// Subscribe to peer connection state changes
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}
