//! H.264 RTP Depacketizer (RFC 6184, spec.md §4.8).

use bytes::{Bytes, BytesMut};

use crate::packetizer::Depacketizer;
use crate::packetizer::h264::nalu;
use shared::error::{Error, Result};

const ANNEX_B_START_CODE: [u8; 4] = [0, 0, 0, 1];

#[derive(Default, Debug, Clone)]
pub struct H264Depacketizer {
    fu_buffer: BytesMut,
    sps_seen: bool,
    pps_seen: bool,
    key_frame_seen: bool,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn gated(&self) -> bool {
        self.sps_seen && self.pps_seen && self.key_frame_seen
    }

    fn emit(out: &mut BytesMut, nalu: &[u8]) {
        out.extend_from_slice(&ANNEX_B_START_CODE);
        out.extend_from_slice(nalu);
    }

    fn observe(&mut self, t: u8) {
        match t {
            nalu::NALU_TYPE_SPS => self.sps_seen = true,
            nalu::NALU_TYPE_PPS => self.pps_seen = true,
            _ if nalu::is_key_frame(t) => self.key_frame_seen = true,
            _ => {}
        }
    }
}

impl Depacketizer for H264Depacketizer {
    fn depacketize(&mut self, payload: &Bytes) -> Result<Bytes> {
        if payload.is_empty() {
            return Err(Error::ErrShortPacket);
        }
        let t = nalu::nalu_type(payload[0]);
        let mut out = BytesMut::new();

        match t {
            24 => {
                // STAP-A: sequence of (u16 size, nalu)*.
                let mut offset = 1;
                while offset + 2 <= payload.len() {
                    let size = u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
                    offset += 2;
                    if offset + size > payload.len() {
                        return Err(Error::ErrShortPacket);
                    }
                    let unit = &payload[offset..offset + size];
                    self.observe(nalu::nalu_type(unit[0]));
                    if self.gated() {
                        Self::emit(&mut out, unit);
                    }
                    offset += size;
                }
            }
            28 => {
                // FU-A.
                if payload.len() < 2 {
                    return Err(Error::ErrShortPacket);
                }
                let fu_header = payload[1];
                let start = fu_header & 0x80 != 0;
                let end = fu_header & 0x40 != 0;
                let original_type = fu_header & nalu::NALU_TYPE_MASK;
                let nri = nalu::nri(payload[0]);

                if start {
                    self.fu_buffer.clear();
                    self.fu_buffer.extend_from_slice(&[nri | original_type]);
                }
                self.fu_buffer.extend_from_slice(&payload[2..]);

                if end {
                    self.observe(original_type);
                    if self.gated() {
                        Self::emit(&mut out, &self.fu_buffer);
                    }
                    self.fu_buffer.clear();
                }
            }
            _ => {
                self.observe(t);
                if self.gated() {
                    Self::emit(&mut out, payload);
                }
            }
        }

        Ok(out.freeze())
    }

    fn is_partition_head(&self, payload: &Bytes) -> bool {
        if payload.is_empty() {
            return false;
        }
        match nalu::nalu_type(payload[0]) {
            28 => payload.len() >= 2 && payload[1] & 0x80 != 0,
            _ => true,
        }
    }

    fn is_partition_tail(&self, marker: bool, payload: &Bytes) -> bool {
        if payload.is_empty() {
            return marker;
        }
        match nalu::nalu_type(payload[0]) {
            28 => payload.len() >= 2 && payload[1] & 0x40 != 0,
            _ => marker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gates_until_sps_pps_key_frame() {
        let mut d = H264Depacketizer::new();
        let sps = Bytes::from_static(&[0x67, 0x01]);
        let out = d.depacketize(&sps).unwrap();
        assert!(out.is_empty());

        let pps = Bytes::from_static(&[0x68, 0x02]);
        let out = d.depacketize(&pps).unwrap();
        assert!(out.is_empty());

        let idr = Bytes::from_static(&[0x65, 0x03, 0x04]);
        let out = d.depacketize(&idr).unwrap();
        assert!(!out.is_empty());
        assert_eq!(&out[..4], &ANNEX_B_START_CODE);
        assert_eq!(&out[4..], &idr[..]);
    }

    #[test]
    fn test_fu_a_reassembly() {
        let mut d = H264Depacketizer::new();
        d.sps_seen = true;
        d.pps_seen = true;

        let nri = 0x60;
        let start = Bytes::from_static(&[nri | 28, 0x85, 0xAA]); // S=1, type=5
        let mid = Bytes::from_static(&[nri | 28, 0x05, 0xBB]);
        let end = Bytes::from_static(&[nri | 28, 0x45, 0xCC]);

        assert!(d.depacketize(&start).unwrap().is_empty());
        assert!(d.depacketize(&mid).unwrap().is_empty());
        let out = d.depacketize(&end).unwrap();

        assert_eq!(&out[..4], &ANNEX_B_START_CODE);
        assert_eq!(&out[4], &(nri | 5));
        assert_eq!(&out[5..], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_stap_a_splits_into_multiple_nalus() {
        let mut d = H264Depacketizer::new();
        d.key_frame_seen = true;

        let mut payload = vec![24u8];
        payload.extend_from_slice(&[0, 2, 0x67, 0xAA]); // SPS
        payload.extend_from_slice(&[0, 2, 0x68, 0xBB]); // PPS
        let out = d.depacketize(&Bytes::from(payload)).unwrap();
        assert!(!out.is_empty());
        assert!(d.sps_seen);
        assert!(d.pps_seen);
    }
}
