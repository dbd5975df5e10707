//! Playback through an external decode/render pipeline
//!
//! ```text
//! AccessUnit -> stdin | ffmpeg -f <h264|hevc> ... -f rawvideo - | ffplay -f rawvideo ...
//! ```
//!
//! A configured sink command replaces the whole pipeline and receives the
//! Annex B stream on stdin.

mod bridge;

pub use bridge::{PlaybackBridge, CLOSE_TIMEOUT};

use crate::config::PlaybackConfig;
use crate::webrtc::VideoCodec;

/// ffmpeg arguments: elementary stream on stdin, raw frames on stdout
pub fn decoder_args(codec: VideoCodec, config: &PlaybackConfig) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        codec.elementary_stream_format().to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
        "-s".to_string(),
        config.size_arg(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        config.pixel_format.clone(),
        "-".to_string(),
    ]
}

/// ffplay arguments: raw frames on stdin
pub fn renderer_args(config: &PlaybackConfig) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        config.pixel_format.clone(),
        "-video_size".to_string(),
        config.size_arg(),
        "-autoexit".to_string(),
        "-".to_string(),
    ]
}
