//! VP8 RTP Depacketizer (RFC 7741, spec.md §4.8).

use bytes::Bytes;

use crate::packetizer::Depacketizer;
use shared::error::{Error, Result};

#[derive(Default, Debug, Clone)]
pub struct Vp8Depacketizer {
    key_frame_seen: bool,
}

impl Vp8Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the offset of the VP8 payload header (and, for the first
    /// packet of a frame, the encoded frame), past the payload descriptor
    /// (RFC 7741 §4.2): `|X|R|N|S|R|PID|`, with optional extension bytes
    /// when X=1.
    fn descriptor_len(payload: &[u8]) -> Result<usize> {
        if payload.is_empty() {
            return Err(Error::ErrShortPacket);
        }
        let x = payload[0] & 0x80 != 0;
        let mut len = 1;
        if !x {
            return Ok(len);
        }
        if payload.len() <= len {
            return Err(Error::ErrShortPacket);
        }
        let ext = payload[len];
        len += 1;
        let i = ext & 0x80 != 0;
        let l = ext & 0x40 != 0;
        let t = ext & 0x20 != 0;
        let k = ext & 0x10 != 0;
        if i {
            if payload.len() <= len {
                return Err(Error::ErrShortPacket);
            }
            len += if payload[len] & 0x80 != 0 { 2 } else { 1 };
        }
        if l {
            len += 1;
        }
        if t || k {
            len += 1;
        }
        if payload.len() < len {
            return Err(Error::ErrShortPacket);
        }
        Ok(len)
    }
}

impl Depacketizer for Vp8Depacketizer {
    fn depacketize(&mut self, payload: &Bytes) -> Result<Bytes> {
        let offset = Self::descriptor_len(payload)?;
        let is_start = payload[0] & 0x10 != 0; // S bit
        if is_start && offset < payload.len() && payload[offset] & 0x01 == 0 {
            self.key_frame_seen = true;
        }
        if !self.key_frame_seen {
            return Ok(Bytes::new());
        }
        Ok(payload.slice(offset..))
    }

    fn is_partition_head(&self, payload: &Bytes) -> bool {
        !payload.is_empty() && payload[0] & 0x10 != 0
    }

    fn is_partition_tail(&self, marker: bool, _payload: &Bytes) -> bool {
        marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_until_key_frame() {
        let mut d = Vp8Depacketizer::new();
        let non_key = Bytes::from_static(&[0x10, 0x01, 0x00, 0xAA]); // delta frame
        assert!(d.depacketize(&non_key).unwrap().is_empty());

        let key = Bytes::from_static(&[0x10, 0x00, 0x00, 0xBB]);
        let out = d.depacketize(&key).unwrap();
        assert_eq!(&out[..], &[0x00, 0x00, 0xBB]);
    }

    #[test]
    fn test_strips_extended_descriptor_bytes() {
        let mut d = Vp8Depacketizer::new();
        // X=1, S=1; ext byte I=1,L=0,T=0,K=0; picture id (short form)
        let payload = Bytes::from_static(&[0x90, 0x80, 0x05, 0x00, 0x00, 0xCC]);
        let out = d.depacketize(&payload).unwrap();
        assert_eq!(&out[..], &[0x00, 0x00, 0xCC]);
    }
}
