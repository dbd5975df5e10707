//! WebRTC signaling types

use serde::{Deserialize, Serialize};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Content type of WHEP offer and answer bodies
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Cheap structural check that a body is an SDP document
///
/// Every session description starts with the protocol version line.
pub fn is_session_description(text: &str) -> bool {
    text.trim_start().starts_with("v=")
}

/// Peer connection state notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// The peer connection will not deliver media again
    pub fn is_finished(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }

    pub(crate) fn from_rtc(state: RTCPeerConnectionState) -> Option<Self> {
        match state {
            RTCPeerConnectionState::New => Some(ConnectionState::New),
            RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
            RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
            RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
            RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
            RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_session_description() {
        assert!(is_session_description("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n"));
        assert!(is_session_description("\r\nv=0\r\n"));
        assert!(!is_session_description(""));
        assert!(!is_session_description("<html>bad gateway</html>"));
    }

    #[test]
    fn test_connection_state_mapping() {
        assert_eq!(
            ConnectionState::from_rtc(RTCPeerConnectionState::Connected),
            Some(ConnectionState::Connected)
        );
        assert_eq!(
            ConnectionState::from_rtc(RTCPeerConnectionState::Unspecified),
            None
        );
        assert!(ConnectionState::Failed.is_finished());
        assert!(!ConnectionState::Disconnected.is_finished());
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
