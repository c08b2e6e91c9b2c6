//! H.265 RTP Depacketizer (RFC 7798, spec.md §4.8).

use bytes::{Bytes, BytesMut};

use crate::packetizer::Depacketizer;
use crate::packetizer::h265::nalu;
use shared::error::{Error, Result};

const AP_TYPE: u8 = 48;
const FU_TYPE: u8 = 49;
const ANNEX_B_START_CODE: [u8; 4] = [0, 0, 0, 1];

#[derive(Default, Debug, Clone)]
pub struct H265Depacketizer {
    fu_buffer: BytesMut,
    vps_seen: bool,
    sps_seen: bool,
    pps_seen: bool,
    key_frame_seen: bool,
}

impl H265Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn gated(&self) -> bool {
        self.vps_seen && self.sps_seen && self.pps_seen && self.key_frame_seen
    }

    fn emit(out: &mut BytesMut, unit: &[u8]) {
        out.extend_from_slice(&ANNEX_B_START_CODE);
        out.extend_from_slice(unit);
    }

    fn observe(&mut self, t: u8) {
        match t {
            nalu::NALU_TYPE_VPS => self.vps_seen = true,
            nalu::NALU_TYPE_SPS => self.sps_seen = true,
            nalu::NALU_TYPE_PPS => self.pps_seen = true,
            _ if nalu::is_key_frame(t) => self.key_frame_seen = true,
            _ => {}
        }
    }
}

impl Depacketizer for H265Depacketizer {
    fn depacketize(&mut self, payload: &Bytes) -> Result<Bytes> {
        if payload.len() < 2 {
            return Err(Error::ErrShortPacket);
        }
        let t = nalu::nalu_type(payload[0]);
        let mut out = BytesMut::new();

        match t {
            AP_TYPE => {
                let mut offset = 2;
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
            FU_TYPE => {
                if payload.len() < 3 {
                    return Err(Error::ErrShortPacket);
                }
                let fu_header = payload[2];
                let start = fu_header & 0x80 != 0;
                let end = fu_header & 0x40 != 0;
                let original_type = fu_header & 0x3F;
                let layer_id = (payload[1] >> 3) & 0x3F;
                let tid = payload[1] & 0x07;

                if start {
                    self.fu_buffer.clear();
                    self.fu_buffer.extend_from_slice(&[
                        (original_type << 1) & 0x7E,
                        ((layer_id & 0x3F) << 3) | (tid & 0x07),
                    ]);
                }
                self.fu_buffer.extend_from_slice(&payload[3..]);

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
        if payload.len() < 3 {
            return true;
        }
        match nalu::nalu_type(payload[0]) {
            FU_TYPE => payload[2] & 0x80 != 0,
            _ => true,
        }
    }

    fn is_partition_tail(&self, marker: bool, payload: &Bytes) -> bool {
        if payload.len() < 3 {
            return marker;
        }
        match nalu::nalu_type(payload[0]) {
            FU_TYPE => payload[2] & 0x40 != 0,
            _ => marker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gates_until_vps_sps_pps_key_frame() {
        let mut d = H265Depacketizer::new();
        let vps = Bytes::from_static(&[32u8 << 1, 0x01, 0xAA]);
        let sps = Bytes::from_static(&[33u8 << 1, 0x01, 0xBB]);
        let pps = Bytes::from_static(&[34u8 << 1, 0x01, 0xCC]);
        assert!(d.depacketize(&vps).unwrap().is_empty());
        assert!(d.depacketize(&sps).unwrap().is_empty());
        assert!(d.depacketize(&pps).unwrap().is_empty());

        let idr = Bytes::from_static(&[19u8 << 1, 0x01, 0x80, 0xDD]);
        let out = d.depacketize(&idr).unwrap();
        assert!(!out.is_empty());
        assert_eq!(&out[..4], &ANNEX_B_START_CODE);
    }

    #[test]
    fn test_fu_reassembly() {
        let mut d = H265Depacketizer::new();
        d.vps_seen = true;
        d.sps_seen = true;
        d.pps_seen = true;

        let nal_hdr = [FU_TYPE << 1, 0x01];
        let start = {
            let mut v = nal_hdr.to_vec();
            v.push(0x80 | 19); // S=1, type=19
            v.push(0xAA);
            Bytes::from(v)
        };
        let end = {
            let mut v = nal_hdr.to_vec();
            v.push(0x40 | 19);
            v.push(0xBB);
            Bytes::from(v)
        };

        assert!(d.depacketize(&start).unwrap().is_empty());
        let out = d.depacketize(&end).unwrap();
        assert_eq!(&out[..4], &ANNEX_B_START_CODE);
        assert_eq!(&out[6..], &[0xAA, 0xBB]);
    }
}
