use std::time::Duration;

use thiserror::Error;

use crate::whep::SessionState;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Unsupported track codec: {0}")]
    UnsupportedTrackCodec(String),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidState { from: SessionState, to: SessionState },

    #[error("ICE candidate gathering did not complete within {0:?}")]
    GatheringTimeout(Duration),

    #[error("WHEP server rejected offer: {status}\n{body}")]
    NegotiationRejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    #[error("Invalid SDP answer: {0}")]
    InvalidAnswer(String),

    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    #[error("Failed to start playback: {0}")]
    PlaybackStart(String),

    #[error("Playback write failed: {0}")]
    PlaybackWrite(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    /// Whether the error is scoped to a single track rather than the session
    pub fn is_track_local(&self) -> bool {
        matches!(
            self,
            AppError::UnsupportedTrackCodec(_)
                | AppError::PlaybackStart(_)
                | AppError::PlaybackWrite(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
