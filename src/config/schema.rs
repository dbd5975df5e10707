use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::webrtc::config::WebRtcConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// WHEP signaling settings
    pub whep: WhepConfig,
    /// ICE server settings
    pub webrtc: WebRtcConfig,
    /// Decode/render pipeline settings
    pub playback: PlaybackConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            whep: WhepConfig::default(),
            webrtc: WebRtcConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reject configurations that cannot produce a working session
    pub fn validate(&self) -> Result<()> {
        if self.whep.endpoint_url.trim().is_empty() {
            return Err(AppError::Config("WHEP endpoint URL is empty".to_string()));
        }
        if self.whep.http_timeout_secs == 0 {
            return Err(AppError::Config("HTTP timeout must be non-zero".to_string()));
        }
        if self.whep.gathering_timeout_ms == 0 {
            return Err(AppError::Config(
                "ICE gathering timeout must be non-zero".to_string(),
            ));
        }
        if self.playback.width == 0 || self.playback.height == 0 {
            return Err(AppError::Config(format!(
                "Invalid output size {}x{}",
                self.playback.width, self.playback.height
            )));
        }
        if let Some(ref cmd) = self.playback.sink_command {
            if cmd.is_empty() || cmd[0].trim().is_empty() {
                return Err(AppError::Config("Sink command is empty".to_string()));
            }
        }
        Ok(())
    }
}

/// WHEP signaling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WhepConfig {
    /// WHEP resource URL the offer is POSTed to
    pub endpoint_url: String,
    /// Preferred video codec ("h264" or "h265")
    pub codec: String,
    /// Bearer token sent in the Authorization header
    pub bearer_token: Option<String>,
    /// Timeout for each HTTP exchange
    pub http_timeout_secs: u64,
    /// ICE candidate gathering timeout (ms)
    pub gathering_timeout_ms: u64,
    /// Maximum number of 3xx hops followed while POSTing the offer
    pub max_redirects: usize,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for WhepConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            codec: "h264".to_string(),
            bearer_token: None,
            http_timeout_secs: 10,
            gathering_timeout_ms: 5000,
            max_redirects: 5,
            user_agent: format!("whep-player/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl WhepConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn gathering_timeout(&self) -> Duration {
        Duration::from_millis(self.gathering_timeout_ms)
    }
}

/// Decode/render pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// ffmpeg binary (decodes the elementary stream to raw frames)
    pub ffmpeg_path: String,
    /// ffplay binary (renders the raw frames)
    pub ffplay_path: String,
    /// Output frame width
    pub width: u32,
    /// Output frame height
    pub height: u32,
    /// Raw frame pixel format passed between ffmpeg and ffplay
    pub pixel_format: String,
    /// Replaces the ffmpeg/ffplay pipeline; receives the Annex B stream on stdin
    pub sink_command: Option<Vec<String>>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffplay_path: "ffplay".to_string(),
            width: 1280,
            height: 720,
            pixel_format: "yuv420p".to_string(),
            sink_command: None,
        }
    }
}

impl PlaybackConfig {
    /// Geometry in ffmpeg's `WxH` notation
    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.whep.endpoint_url = "http://localhost:8080/whep".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.whep.codec, "h264");
        assert_eq!(config.whep.http_timeout(), Duration::from_secs(10));
        assert_eq!(config.whep.gathering_timeout(), Duration::from_secs(5));
        assert_eq!(config.playback.size_arg(), "1280x720");
        assert!(config.webrtc.stun_servers.is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(valid_config().validate().is_ok());
        assert!(AppConfig::default().validate().is_err());

        let mut config = valid_config();
        config.playback.width = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = valid_config();
        config.whep.gathering_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.playback.sink_command = Some(vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"whep": {"endpoint_url": "https://example.com/whep", "codec": "h265"}}"#,
        )
        .unwrap();
        assert_eq!(config.whep.codec, "h265");
        assert_eq!(config.whep.max_redirects, 5);
        assert_eq!(config.playback.ffmpeg_path, "ffmpeg");
    }
}
