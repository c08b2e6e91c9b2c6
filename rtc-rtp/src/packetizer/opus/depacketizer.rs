//! Opus RTP Depacketizer (RFC 7587, spec.md §4.8).
//!
//! Every Opus RTP payload is a complete, standalone frame — there is no
//! partitioning or fragmentation to reassemble.

use bytes::Bytes;

use crate::packetizer::Depacketizer;
use shared::error::Result;

#[derive(Default, Debug, Clone)]
pub struct OpusDepacketizer;

impl OpusDepacketizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Depacketizer for OpusDepacketizer {
    fn depacketize(&mut self, payload: &Bytes) -> Result<Bytes> {
        Ok(payload.clone())
    }

    fn is_partition_head(&self, _payload: &Bytes) -> bool {
        true
    }

    fn is_partition_tail(&self, _marker: bool, _payload: &Bytes) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_packet_is_standalone() {
        let mut d = OpusDepacketizer::new();
        let payload = Bytes::from_static(&[0xAA, 0xBB]);
        let out = d.depacketize(&payload).unwrap();
        assert_eq!(&out[..], &payload[..]);
        assert_eq!(
            d.packet_kind(&payload, false),
            crate::packetizer::PacketKind::Standalone
        );
    }
}
