//! Per-track routing from the transport engine to playback
//!
//! Each announced remote track gets its own task:
//!
//! ```text
//! RemoteTrack.packets -> Reassembler -> PlaybackBridge
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::depacketize::Reassembler;
use crate::error::{AppError, Result};
use crate::playback::PlaybackBridge;
use crate::webrtc::{RemoteTrack, TrackInfo, VideoCodec};

/// Invoked once per track after its playback pipeline has started
pub type DecoderReadyCallback = Arc<dyn Fn(&TrackInfo, VideoCodec) + Send + Sync>;

/// Counters for one track read loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackStats {
    pub track_id: String,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub units_written: u64,
    pub bytes_written: u64,
}

/// Starts one read loop per remote track
pub struct TrackRouter {
    playback: Arc<PlaybackConfig>,
    on_decoder_ready: Option<DecoderReadyCallback>,
    cancel: CancellationToken,
}

impl TrackRouter {
    pub fn new(playback: PlaybackConfig, cancel: CancellationToken) -> Self {
        Self {
            playback: Arc::new(playback),
            on_decoder_ready: None,
            cancel,
        }
    }

    pub fn with_decoder_ready(mut self, callback: Option<DecoderReadyCallback>) -> Self {
        self.on_decoder_ready = callback;
        self
    }

    /// Route tracks until cancelled or the event queue closes
    ///
    /// Returns stats of every track that was played.
    pub async fn run(self, mut tracks: mpsc::Receiver<RemoteTrack>) -> Vec<TrackStats> {
        let mut tasks = JoinSet::new();
        let mut finished = Vec::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Track router cancelled");
                    break;
                }
                track = tracks.recv() => {
                    let Some(track) = track else {
                        debug!("Track event queue closed");
                        break;
                    };
                    tasks.spawn(handle_track(
                        track,
                        self.playback.clone(),
                        self.on_decoder_ready.clone(),
                        self.cancel.clone(),
                    ));
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    collect(joined, &mut finished);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            collect(joined, &mut finished);
        }
        finished
    }
}

fn collect(
    joined: std::result::Result<Result<TrackStats>, tokio::task::JoinError>,
    finished: &mut Vec<TrackStats>,
) {
    match joined {
        Ok(Ok(stats)) => finished.push(stats),
        Ok(Err(e)) => warn!("Track skipped: {}", e),
        Err(e) => warn!("Track task failed: {}", e),
    }
}

/// Play one track until its packets end, it is cancelled, or playback fails
async fn handle_track(
    track: RemoteTrack,
    playback: Arc<PlaybackConfig>,
    on_decoder_ready: Option<DecoderReadyCallback>,
    cancel: CancellationToken,
) -> Result<TrackStats> {
    let RemoteTrack { info, mut packets } = track;

    let codec = VideoCodec::from_mime_type(&info.mime_type)
        .ok_or_else(|| AppError::UnsupportedTrackCodec(info.mime_type.clone()))?;

    let bridge = PlaybackBridge::start(codec, &playback)?;
    info!(
        "Track {} ({}, PT={}, clock {}) playing",
        info.id, codec, info.payload_type, info.clock_rate
    );

    if let Some(callback) = &on_decoder_ready {
        callback(&info, codec);
    }

    let mut reassembler = Reassembler::for_codec(codec);
    let stats = read_loop(&info, &mut packets, &mut reassembler, &bridge, &cancel).await;

    bridge.close().await;
    info!(
        "Track {} finished: {} packets, {} dropped, {} units, {} bytes",
        stats.track_id,
        stats.packets_received,
        stats.packets_dropped,
        stats.units_written,
        stats.bytes_written
    );
    Ok(stats)
}

async fn read_loop(
    info: &TrackInfo,
    packets: &mut mpsc::Receiver<rtp::packet::Packet>,
    reassembler: &mut Reassembler,
    bridge: &PlaybackBridge,
    cancel: &CancellationToken,
) -> TrackStats {
    let mut stats = TrackStats {
        track_id: info.id.clone(),
        ..Default::default()
    };

    loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Track {} cancelled", info.id);
                break;
            }
            packet = packets.recv() => match packet {
                Some(packet) => packet,
                None => {
                    debug!("Track {} stream ended", info.id);
                    break;
                }
            },
        };
        stats.packets_received += 1;

        // Malformed packets are logged by the reassembler
        let Ok(units) = reassembler.push(&packet) else {
            stats.packets_dropped += 1;
            continue;
        };

        for unit in &units {
            if let Err(e) = bridge.write(unit).await {
                warn!("Track {} playback stopped: {}", info.id, e);
                return stats;
            }
            stats.units_written += 1;
            stats.bytes_written += unit.len() as u64;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depacketize::tests::packet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn track(mime_type: &str) -> (RemoteTrack, mpsc::Sender<rtp::packet::Packet>) {
        let (tx, rx) = mpsc::channel(16);
        let info = TrackInfo {
            id: "video0".to_string(),
            mime_type: mime_type.to_string(),
            payload_type: 96,
            clock_rate: 90000,
            ssrc: 1234,
        };
        (RemoteTrack { info, packets: rx }, tx)
    }

    fn file_sink(path: &std::path::Path) -> PlaybackConfig {
        PlaybackConfig {
            sink_command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("cat > '{}'", path.display()),
            ]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_track_packets_reach_playback() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("stream.h264");

        let ready = Arc::new(AtomicUsize::new(0));
        let ready_count = ready.clone();
        let callback: DecoderReadyCallback = Arc::new(move |info: &TrackInfo, codec: VideoCodec| {
            assert_eq!(info.id, "video0");
            assert_eq!(codec, VideoCodec::H264);
            ready_count.fetch_add(1, Ordering::SeqCst);
        });

        let router = TrackRouter::new(file_sink(&out), CancellationToken::new())
            .with_decoder_ready(Some(callback));

        let (events_tx, events_rx) = mpsc::channel(4);
        let (remote, packets_tx) = track("video/H264");
        events_tx.send(remote).await.unwrap();
        drop(events_tx);

        packets_tx.send(packet(1, 0, &[0x67, 0x42])).await.unwrap();
        packets_tx.send(packet(2, 0, &[0x1D, 0x00])).await.unwrap();
        packets_tx.send(packet(3, 3000, &[0x41, 0x9a])).await.unwrap();
        drop(packets_tx);

        let stats = router.run(events_rx).await;
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].packets_received, 3);
        assert_eq!(stats[0].packets_dropped, 1);
        assert_eq!(stats[0].units_written, 2);
        assert_eq!(stats[0].bytes_written, 12);
        assert_eq!(ready.load(Ordering::SeqCst), 1);

        let written = std::fs::read(&out).unwrap();
        assert_eq!(written, vec![0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x41, 0x9a]);
    }

    #[tokio::test]
    async fn test_unsupported_track_codec_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ready = Arc::new(AtomicUsize::new(0));
        let ready_count = ready.clone();
        let callback: DecoderReadyCallback = Arc::new(move |_: &TrackInfo, _: VideoCodec| {
            ready_count.fetch_add(1, Ordering::SeqCst);
        });

        let router = TrackRouter::new(
            file_sink(&dir.path().join("unused")),
            CancellationToken::new(),
        )
        .with_decoder_ready(Some(callback));

        let (events_tx, events_rx) = mpsc::channel(4);
        let (vp8, vp8_packets) = track("video/VP8");
        let (h264, h264_packets) = track("video/H264");
        events_tx.send(vp8).await.unwrap();
        events_tx.send(h264).await.unwrap();
        drop(events_tx);
        drop(h264_packets);

        let stats = router.run(events_rx).await;
        assert_eq!(stats.len(), 1);
        assert_eq!(ready.load(Ordering::SeqCst), 1);
        // The skipped track's queue is never read
        assert!(vp8_packets.is_closed());
    }

    #[tokio::test]
    async fn test_cancel_stops_open_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let router = TrackRouter::new(file_sink(&dir.path().join("s.h264")), cancel.clone());

        let (events_tx, events_rx) = mpsc::channel(4);
        let (remote, packets_tx) = track("video/H264");
        events_tx.send(remote).await.unwrap();

        let handle = tokio::spawn(router.run(events_rx));
        packets_tx.send(packet(1, 0, &[0x41, 0x01])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.len(), 1);
        drop(events_tx);
        drop(packets_tx);
    }
}
