//! whep-player - WHEP viewer for H.264/H.265 streams
//!
//! Negotiates a receive-only WebRTC session with a WHEP endpoint, reassembles
//! the video track into Annex B access units and pipes them into an external
//! decode/render pipeline.

pub mod config;
pub mod depacketize;
pub mod error;
pub mod playback;
pub mod track;
pub mod webrtc;
pub mod whep;

pub use error::{AppError, Result};
