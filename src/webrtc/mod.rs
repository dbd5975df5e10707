//! WebRTC receive side of the player
//!
//! Architecture:
//! ```text
//! WhepSession ---- SDP offer/answer ----> WHEP server
//!      |
//!      v
//! TransportEngine (WebRtcTransport: ICE, DTLS/SRTP, RTCP)
//!      |
//!      v
//! RemoteTrack (RTP packet queue per track)
//! ```

pub mod codec;
pub mod config;
#[cfg(test)]
pub(crate) mod mock;
pub mod peer;
pub mod signaling;
pub mod transport;

pub use codec::VideoCodec;
pub use config::{TurnServer, WebRtcConfig};
pub use peer::WebRtcTransport;
pub use signaling::ConnectionState;
pub use transport::{RemoteTrack, TrackInfo, TransportEngine, VideoCapability};
