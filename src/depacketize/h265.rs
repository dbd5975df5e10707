//! H.265/HEVC RTP depacketizer (RFC 7798, no DONL)
//!
//! H.265 NAL unit header (2 bytes):
//! ```text
//! +---------------+---------------+
//! |0|1|2|3|4|5|6|7|0|1|2|3|4|5|6|7|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |F|   Type    |  LayerId  | TID |
//! +---------------+---------------+
//! ```
//!
//! Fragmentation Unit (FU) header follows the 2-byte payload header:
//! ```text
//! +---------------+
//! |0|1|2|3|4|5|6|7|
//! +-+-+-+-+-+-+-+-+
//! |S|E|  FuType   |
//! +---------------+
//! ```

use super::{emit, AccessUnit, DepacketizeError, FragmentBuffer};

/// H.265 NAL header size
const H265_NAL_HEADER_SIZE: usize = 2;

/// Aggregation Packet
const H265_NAL_AP: u8 = 48;
/// Fragmentation Unit
const H265_NAL_FU: u8 = 49;
/// PACI packet
const H265_NAL_PACI: u8 = 50;

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;
const FU_TYPE_MASK: u8 = 0x3F;

/// NAL unit type from the first header byte
fn nal_type(first: u8) -> u8 {
    (first >> 1) & 0x3F
}

#[derive(Debug, Default)]
pub struct H265Depacketizer {
    fragments: FragmentBuffer,
}

impl H265Depacketizer {
    pub fn depacketize(
        &mut self,
        payload: &[u8],
        seq: u16,
        timestamp: u32,
    ) -> Result<Vec<AccessUnit>, DepacketizeError> {
        if payload.is_empty() {
            return Err(DepacketizeError::EmptyPayload);
        }
        if payload.len() < H265_NAL_HEADER_SIZE {
            return Err(DepacketizeError::ShortPacket(payload.len()));
        }

        let typ = nal_type(payload[0]);
        let mut out = Vec::new();
        match typ {
            0..=47 => {
                self.fragments.discard("interrupted by single NAL packet");
                emit(&mut out, typ, payload);
            }
            H265_NAL_AP => {
                self.fragments.discard("interrupted by aggregation packet");
                split_aggregation(&payload[H265_NAL_HEADER_SIZE..], &mut out)?;
            }
            H265_NAL_FU => {
                if payload.len() < H265_NAL_HEADER_SIZE + 1 {
                    return Err(DepacketizeError::ShortPacket(payload.len()));
                }
                let fu_header = payload[2];
                let start = fu_header & FU_START != 0;
                let end = fu_header & FU_END != 0;
                if start && end {
                    return Err(DepacketizeError::InvalidFragmentHeader);
                }

                let fu_type = fu_header & FU_TYPE_MASK;
                let body = &payload[3..];
                if start {
                    // Keep F and the LayerId high bit, restore the type
                    let header = [(payload[0] & 0x81) | (fu_type << 1), payload[1]];
                    self.fragments.start(&header, fu_type, body, seq, timestamp);
                } else {
                    self.fragments.append(body, seq, timestamp)?;
                    if end {
                        out.extend(self.fragments.finish());
                    }
                }
            }
            H265_NAL_PACI => return Err(DepacketizeError::UnsupportedType(H265_NAL_PACI)),
            other => return Err(DepacketizeError::UnsupportedType(other)),
        }

        Ok(out)
    }
}

/// Split an AP body into its units (16-bit size prefixes)
fn split_aggregation(mut body: &[u8], out: &mut Vec<AccessUnit>) -> Result<(), DepacketizeError> {
    let mut units = Vec::new();
    while !body.is_empty() {
        if body.len() < 2 {
            return Err(DepacketizeError::TruncatedAggregation);
        }
        let size = u16::from_be_bytes([body[0], body[1]]) as usize;
        body = &body[2..];
        if size > body.len() {
            return Err(DepacketizeError::TruncatedAggregation);
        }
        let (nalu, rest) = body.split_at(size);
        if let Some(&first) = nalu.first() {
            emit(&mut units, nal_type(first), nalu);
        }
        body = rest;
    }
    out.extend(units);
    Ok(())
}
