//! H.264 RTP depacketizer (RFC 6184, non-interleaved mode)
//!
//! NAL unit header (1 byte):
//! ```text
//! +---------------+
//! |0|1|2|3|4|5|6|7|
//! +-+-+-+-+-+-+-+-+
//! |F|NRI|  Type   |
//! +---------------+
//! ```
//!
//! FU-A carries an FU indicator (type 28) followed by an FU header
//! `|S|E|R|Type|`; the original header is rebuilt from the indicator's F/NRI
//! bits and the FU header's type.

use super::{emit, AccessUnit, DepacketizeError, FragmentBuffer};

const NAL_TYPE_MASK: u8 = 0x1F;
const STAP_A: u8 = 24;
const FU_A: u8 = 28;

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;

#[derive(Debug, Default)]
pub struct H264Depacketizer {
    fragments: FragmentBuffer,
}

impl H264Depacketizer {
    pub fn depacketize(
        &mut self,
        payload: &[u8],
        seq: u16,
        timestamp: u32,
    ) -> Result<Vec<AccessUnit>, DepacketizeError> {
        let first = *payload.first().ok_or(DepacketizeError::EmptyPayload)?;
        let nal_type = first & NAL_TYPE_MASK;

        let mut out = Vec::new();
        match nal_type {
            1..=23 => {
                self.fragments.discard("interrupted by single NAL packet");
                emit(&mut out, nal_type, payload);
            }
            STAP_A => {
                self.fragments.discard("interrupted by STAP-A");
                split_stap_a(&payload[1..], &mut out)?;
            }
            FU_A => {
                if payload.len() < 2 {
                    return Err(DepacketizeError::ShortPacket(payload.len()));
                }
                let fu_header = payload[1];
                let start = fu_header & FU_START != 0;
                let end = fu_header & FU_END != 0;
                if start && end {
                    return Err(DepacketizeError::InvalidFragmentHeader);
                }

                let original_type = fu_header & NAL_TYPE_MASK;
                let body = &payload[2..];
                if start {
                    let header = (first & 0xE0) | original_type;
                    self.fragments
                        .start(&[header], original_type, body, seq, timestamp);
                } else {
                    self.fragments.append(body, seq, timestamp)?;
                    if end {
                        out.extend(self.fragments.finish());
                    }
                }
            }
            // 0 reserved, 25 STAP-B, 26 MTAP16, 27 MTAP24, 29 FU-B, 30-31 reserved
            other => return Err(DepacketizeError::UnsupportedType(other)),
        }

        Ok(out)
    }
}

/// Split a STAP-A body into its units (16-bit size prefixes)
fn split_stap_a(mut body: &[u8], out: &mut Vec<AccessUnit>) -> Result<(), DepacketizeError> {
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
        if let Some(&header) = nalu.first() {
            emit(&mut units, header & NAL_TYPE_MASK, nalu);
        }
        body = rest;
    }
    out.extend(units);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depacketize::START_CODE;
    use bytes::Bytes;
    use rtp::codecs::h264::H264Payloader;
    use rtp::packetizer::Payloader;

    #[test]
    fn test_single_nal_packets_yield_one_unit_each() {
        let mut d = H264Depacketizer::default();
        let payloads: [&[u8]; 3] = [&[0x67, 0x42, 0x1f], &[0x68, 0xce], &[0x65, 0x88, 0x84]];

        let mut units = Vec::new();
        for (i, p) in payloads.iter().enumerate() {
            let out = d.depacketize(p, i as u16, 0).unwrap();
            assert_eq!(out.len(), 1);
            units.extend(out);
        }

        assert_eq!(
            units.iter().map(|u| u.nal_type()).collect::<Vec<_>>(),
            vec![7, 8, 5]
        );
        for (unit, p) in units.iter().zip(payloads.iter()) {
            assert_eq!(&unit.as_bytes()[..4], &START_CODE);
            assert_eq!(unit.nalu(), *p);
        }
    }

    #[test]
    fn test_stap_a_splits_units_and_drops_empty() {
        let mut d = H264Depacketizer::default();
        let payload = [
            0x78, // STAP-A, NRI=3
            0x00, 0x02, 0x67, 0x42, // SPS
            0x00, 0x00, // zero-length entry
            0x00, 0x02, 0x68, 0xce, // PPS
        ];

        let units = d.depacketize(&payload, 1, 0).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].nal_type(), 7);
        assert_eq!(units[0].nalu(), &[0x67, 0x42]);
        assert_eq!(units[1].nal_type(), 8);
        assert_eq!(units[1].nalu(), &[0x68, 0xce]);
    }

    #[test]
    fn test_truncated_stap_a_contributes_nothing() {
        let mut d = H264Depacketizer::default();
        let payload = [0x78, 0x00, 0x02, 0x67, 0x42, 0x00, 0x09, 0x68];
        assert_eq!(
            d.depacketize(&payload, 1, 0),
            Err(DepacketizeError::TruncatedAggregation)
        );
    }

    #[test]
    fn test_fu_a_reassembly_rebuilds_header() {
        let mut d = H264Depacketizer::default();
        // indicator F=0 NRI=3 type=28, original type 5
        assert!(d.depacketize(&[0x7C, 0x85, 1, 2], 10, 90).unwrap().is_empty());
        assert!(d.depacketize(&[0x7C, 0x05, 3, 4], 11, 90).unwrap().is_empty());
        let units = d.depacketize(&[0x7C, 0x45, 5], 12, 90).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].nal_type(), 5);
        assert_eq!(units[0].nalu(), &[0x65, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_fu_a_errors() {
        let mut d = H264Depacketizer::default();
        assert_eq!(
            d.depacketize(&[0x7C, 0xC5, 1], 1, 0),
            Err(DepacketizeError::InvalidFragmentHeader)
        );
        assert_eq!(
            d.depacketize(&[0x7C, 0x45, 1], 2, 0),
            Err(DepacketizeError::MissingStart)
        );
        assert_eq!(d.depacketize(&[0x7C], 3, 0), Err(DepacketizeError::ShortPacket(1)));
    }

    #[test]
    fn test_lost_fragment_drops_unit_then_recovers() {
        let mut d = H264Depacketizer::default();
        d.depacketize(&[0x7C, 0x85, 1], 1, 90).unwrap();
        // seq 2 lost
        assert!(matches!(
            d.depacketize(&[0x7C, 0x45, 3], 3, 90),
            Err(DepacketizeError::SequenceGap { expected: 2, got: 3 })
        ));

        let units = d.depacketize(&[0x41, 0x9a], 4, 180).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].nal_type(), 1);
    }

    #[test]
    fn test_unsupported_types() {
        let mut d = H264Depacketizer::default();
        for t in [0u8, 25, 26, 27, 29, 30, 31] {
            assert_eq!(
                d.depacketize(&[0x60 | t, 0x00], 1, 0),
                Err(DepacketizeError::UnsupportedType(t))
            );
        }
        assert_eq!(d.depacketize(&[], 1, 0), Err(DepacketizeError::EmptyPayload));
    }

    #[test]
    fn test_payloader_round_trip() {
        let mut nalu = vec![0x65u8];
        nalu.extend((0..4000u32).map(|i| (i % 251 + 1) as u8));

        let mut payloader = H264Payloader::default();
        let payloads = payloader
            .payload(1200, &Bytes::from(nalu.clone()))
            .unwrap();
        assert!(payloads.len() > 1);

        let mut d = H264Depacketizer::default();
        let mut units = Vec::new();
        for (i, p) in payloads.iter().enumerate() {
            units.extend(d.depacketize(p, 100 + i as u16, 3000).unwrap());
        }

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].nal_type(), 5);
        assert_eq!(units[0].nalu(), nalu.as_slice());
    }
}
