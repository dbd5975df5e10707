//! Access-unit reassembly from RTP payloads
//!
//! Turns the ordered packet stream of one track into start-code delimited
//! NAL units ready to be piped into a decoder.
//!
//! ```text
//! RTP packet -> Reassembler (H264 | H265) -> AccessUnit (00 00 00 01 + NALU)
//! ```

mod h264;
mod h265;

pub use h264::H264Depacketizer;
pub use h265::H265Depacketizer;

use bytes::{BufMut, Bytes, BytesMut};
use rtp::packet::Packet;
use thiserror::Error;
use tracing::{trace, warn};

use crate::webrtc::VideoCodec;

/// Annex B start code prefixed to every emitted unit
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Upper bound for one fragmented unit
pub const MAX_NALU_SIZE: usize = 8 * 1024 * 1024;

/// Per-packet depacketization failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepacketizeError {
    #[error("empty payload")]
    EmptyPayload,

    #[error("payload too short ({0} bytes)")]
    ShortPacket(usize),

    #[error("unsupported packet type {0}")]
    UnsupportedType(u8),

    #[error("truncated aggregation packet")]
    TruncatedAggregation,

    #[error("fragment header has both start and end bits set")]
    InvalidFragmentHeader,

    #[error("fragment continuation without start")]
    MissingStart,

    #[error("sequence gap in fragmented unit: expected {expected}, got {got}")]
    SequenceGap { expected: u16, got: u16 },

    #[error("timestamp changed inside fragmented unit: {expected} -> {got}")]
    TimestampMismatch { expected: u32, got: u32 },

    #[error("fragmented unit exceeds {0} bytes")]
    UnitTooLarge(usize),
}

/// One start-code prefixed NAL unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    nal_type: u8,
    data: Bytes,
}

impl AccessUnit {
    /// Build a unit from a bare NAL unit (header included)
    pub fn new(nal_type: u8, nalu: &[u8]) -> Self {
        let mut data = BytesMut::with_capacity(START_CODE.len() + nalu.len());
        data.put_slice(&START_CODE);
        data.put_slice(nalu);
        Self {
            nal_type,
            data: data.freeze(),
        }
    }

    /// Codec-specific NAL unit type
    pub fn nal_type(&self) -> u8 {
        self.nal_type
    }

    /// Bytes to write to the decoder, start code included
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// NAL unit without the start code
    pub fn nalu(&self) -> &[u8] {
        &self.data[START_CODE.len()..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the unit carries no NAL bytes
    pub fn is_empty(&self) -> bool {
        self.data.len() <= START_CODE.len()
    }
}

/// Push a unit unless it is empty
pub(crate) fn emit(out: &mut Vec<AccessUnit>, nal_type: u8, nalu: &[u8]) {
    if !nalu.is_empty() {
        out.push(AccessUnit::new(nal_type, nalu));
    }
}

/// Reassembly buffer for a unit split over several packets
///
/// Fragments must carry consecutive sequence numbers and one timestamp.
#[derive(Debug, Default)]
pub(crate) struct FragmentBuffer {
    buf: BytesMut,
    nal_type: u8,
    timestamp: u32,
    next_seq: u16,
    active: bool,
}

impl FragmentBuffer {
    /// Begin a unit with its rebuilt NAL header
    pub fn start(
        &mut self,
        header: &[u8],
        nal_type: u8,
        payload: &[u8],
        seq: u16,
        timestamp: u32,
    ) {
        self.discard("new start fragment");

        self.buf.clear();
        self.buf.put_slice(&START_CODE);
        self.buf.put_slice(header);
        self.buf.put_slice(payload);
        self.nal_type = nal_type;
        self.timestamp = timestamp;
        self.next_seq = seq.wrapping_add(1);
        self.active = true;
    }

    /// Append a middle or end fragment
    pub fn append(
        &mut self,
        payload: &[u8],
        seq: u16,
        timestamp: u32,
    ) -> Result<(), DepacketizeError> {
        if !self.active {
            return Err(DepacketizeError::MissingStart);
        }
        if seq != self.next_seq {
            let expected = self.next_seq;
            self.reset();
            return Err(DepacketizeError::SequenceGap { expected, got: seq });
        }
        if timestamp != self.timestamp {
            let expected = self.timestamp;
            self.reset();
            return Err(DepacketizeError::TimestampMismatch {
                expected,
                got: timestamp,
            });
        }
        if self.buf.len() + payload.len() > MAX_NALU_SIZE {
            self.reset();
            return Err(DepacketizeError::UnitTooLarge(MAX_NALU_SIZE));
        }

        self.buf.put_slice(payload);
        self.next_seq = seq.wrapping_add(1);
        Ok(())
    }

    /// Take the completed unit
    pub fn finish(&mut self) -> Option<AccessUnit> {
        if !self.active {
            return None;
        }
        self.active = false;
        let data = self.buf.split().freeze();
        if data.len() <= START_CODE.len() {
            return None;
        }
        Some(AccessUnit {
            nal_type: self.nal_type,
            data,
        })
    }

    /// Drop a partial unit, if any
    pub fn discard(&mut self, reason: &str) {
        if self.active {
            warn!(
                "Discarding partial NAL type {} ({} bytes, ts={}): {}",
                self.nal_type,
                self.buf.len().saturating_sub(START_CODE.len()),
                self.timestamp,
                reason
            );
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.active = false;
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Codec-specific reassembler bound to one track
#[derive(Debug)]
pub enum Reassembler {
    H264(H264Depacketizer),
    H265(H265Depacketizer),
}

impl Reassembler {
    pub fn for_codec(codec: VideoCodec) -> Self {
        match codec {
            VideoCodec::H264 => Reassembler::H264(H264Depacketizer::default()),
            VideoCodec::H265 => Reassembler::H265(H265Depacketizer::default()),
        }
    }

    pub fn codec(&self) -> VideoCodec {
        match self {
            Reassembler::H264(_) => VideoCodec::H264,
            Reassembler::H265(_) => VideoCodec::H265,
        }
    }

    /// Feed one packet, returning the units it completes
    ///
    /// A malformed packet is logged and contributes nothing; the reassembler
    /// stays usable for the following packets.
    pub fn push(&mut self, packet: &Packet) -> Result<Vec<AccessUnit>, DepacketizeError> {
        let seq = packet.header.sequence_number;
        let ts = packet.header.timestamp;

        let result = match self {
            Reassembler::H264(d) => d.depacketize(&packet.payload, seq, ts),
            Reassembler::H265(d) => d.depacketize(&packet.payload, seq, ts),
        };

        match &result {
            Ok(units) => {
                for unit in units {
                    trace!(
                        "Access unit seq={} ts={} type={} size={}",
                        seq,
                        ts,
                        unit.nal_type(),
                        unit.len()
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Dropping malformed {} packet seq={} ts={}: {}",
                    self.codec(),
                    seq,
                    ts,
                    e
                );
            }
        }

        result
    }
}
