//! Video codecs the player can negotiate and depacketize

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use webrtc::api::media_engine::MIME_TYPE_H264;
use webrtc::rtp_transceiver::RTCPFeedback;

use crate::error::AppError;

/// H.265/HEVC MIME type (RFC 7798)
pub const MIME_TYPE_H265: &str = "video/H265";

/// RTP clock rate shared by every supported video codec
pub const VIDEO_CLOCK_RATE: u32 = 90000;

/// Video codec type for WebRTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264/AVC
    H264,
    /// H.265/HEVC
    H265,
}

impl VideoCodec {
    /// Get MIME type for SDP
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::H264 => MIME_TYPE_H264,
            VideoCodec::H265 => MIME_TYPE_H265,
        }
    }

    /// Get RTP clock rate (always 90kHz for video)
    pub fn clock_rate(&self) -> u32 {
        VIDEO_CLOCK_RATE
    }

    /// Payload type offered for this codec
    pub fn payload_type(&self) -> u8 {
        match self {
            VideoCodec::H264 => 96,
            VideoCodec::H265 => 102,
        }
    }

    /// Get SDP fmtp parameters
    pub fn sdp_fmtp(&self) -> String {
        match self {
            VideoCodec::H264 => {
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f".to_string()
            }
            VideoCodec::H265 => "level-id=180;profile-id=1;tier-flag=0;tx-mode=SRST".to_string(),
        }
    }

    /// RTCP feedback mechanisms advertised for the receive-only track
    pub fn rtcp_feedback(&self) -> Vec<RTCPFeedback> {
        vec![
            RTCPFeedback {
                typ: "goog-remb".to_owned(),
                parameter: "".to_owned(),
            },
            RTCPFeedback {
                typ: "ccm".to_owned(),
                parameter: "fir".to_owned(),
            },
            RTCPFeedback {
                typ: "nack".to_owned(),
                parameter: "".to_owned(),
            },
            RTCPFeedback {
                typ: "nack".to_owned(),
                parameter: "pli".to_owned(),
            },
        ]
    }

    /// ffmpeg demuxer name for the Annex B elementary stream
    pub fn elementary_stream_format(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "hevc",
        }
    }

    /// Match a remote track's MIME type (case-insensitive)
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        if mime_type.eq_ignore_ascii_case(MIME_TYPE_H264) {
            Some(VideoCodec::H264)
        } else if mime_type.eq_ignore_ascii_case(MIME_TYPE_H265)
            || mime_type.eq_ignore_ascii_case("video/HEVC")
        {
            Some(VideoCodec::H265)
        } else {
            None
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H.264",
            VideoCodec::H265 => "H.265/HEVC",
        }
    }
}

impl FromStr for VideoCodec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(VideoCodec::H264),
            "h265" | "hevc" => Ok(VideoCodec::H265),
            _ => Err(AppError::UnsupportedCodec(s.to_string())),
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codec_preference() {
        assert_eq!("h264".parse::<VideoCodec>().unwrap(), VideoCodec::H264);
        assert_eq!("H265".parse::<VideoCodec>().unwrap(), VideoCodec::H265);
        assert_eq!("hevc".parse::<VideoCodec>().unwrap(), VideoCodec::H265);
        assert!(matches!(
            "vp8".parse::<VideoCodec>(),
            Err(AppError::UnsupportedCodec(ref c)) if c == "vp8"
        ));
    }

    #[test]
    fn test_from_mime_type() {
        assert_eq!(VideoCodec::from_mime_type("video/H264"), Some(VideoCodec::H264));
        assert_eq!(VideoCodec::from_mime_type("video/h264"), Some(VideoCodec::H264));
        assert_eq!(VideoCodec::from_mime_type("video/H265"), Some(VideoCodec::H265));
        assert_eq!(VideoCodec::from_mime_type("video/VP8"), None);
        assert_eq!(VideoCodec::from_mime_type("audio/opus"), None);
    }

    #[test]
    fn test_registration_parameters() {
        assert_eq!(VideoCodec::H264.payload_type(), 96);
        assert_eq!(VideoCodec::H265.payload_type(), 102);
        assert_eq!(VideoCodec::H264.clock_rate(), 90000);
        assert_eq!(VideoCodec::H265.clock_rate(), 90000);
        assert_eq!(VideoCodec::H265.elementary_stream_format(), "hevc");
    }
}
