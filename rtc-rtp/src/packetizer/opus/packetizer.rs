//! Opus RTP Packetizer (RFC 7587, spec.md §4.7).
//!
//! One RTP packet per encoded frame. Marker is always false — Opus carries
//! no key-frame concept RTP consumers need signaled. Oversized frames are
//! truncated rather than fragmented; Opus has no RTP fragmentation format.

use std::sync::Arc;

use bytes::Bytes;

use crate::packet::Packet;
use crate::packetizer::{ExtensionWanter, MAX_PAYLOAD_SIZE, Packetizer};
use crate::track::Track;
use shared::error::Result;

#[derive(Debug, Default)]
pub struct OpusPacketizer {
    packet_number: usize,
}

impl OpusPacketizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Packetizer for OpusPacketizer {
    fn generate(
        &mut self,
        track: &Arc<Track>,
        simulcast_ext: &dyn ExtensionWanter,
        twcc_ext: &dyn ExtensionWanter,
        media_protection_overhead: usize,
        pts_usec: i64,
        frame: &[u8],
    ) -> Result<Vec<Packet>> {
        let frame_timestamp = track
            .rtp_time_source
            .lock()
            .unwrap()
            .get_frame_timestamp(pts_usec);
        let max_payload = MAX_PAYLOAD_SIZE.saturating_sub(media_protection_overhead);
        let payload = Bytes::copy_from_slice(&frame[..frame.len().min(max_payload)]);

        let (rollover, seq) = track.rtp_packet_source.lock().unwrap().next_sequence();
        let wants_ext = simulcast_ext.wants(track, false, self.packet_number)
            || twcc_ext.wants(track, false, self.packet_number);
        let extension = wants_ext.then(|| crate::extension::ExtensionBuilder::new().build());
        self.packet_number += 1;

        Ok(vec![Packet {
            track: Arc::clone(track),
            marker: false,
            rollover,
            sequence_number: seq,
            timestamp: frame_timestamp,
            padding: 0,
            extension,
            payload,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packetizer::NoExtension;
    use crate::track::{Codec, Direction, MediaKind};

    #[test]
    fn test_one_packet_per_frame_marker_false() {
        let track = Track::new(
            "t",
            Direction::Publish,
            MediaKind::Audio,
            "m",
            Codec::Opus,
            48_000,
            111,
            1,
        );
        let frame = [0xAAu8, 0xBB, 0xCC];
        let mut packetizer = OpusPacketizer::new();
        let packets = packetizer
            .generate(&track, &NoExtension, &NoExtension, 0, 0, &frame)
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert!(!packets[0].marker);
        assert_eq!(&packets[0].payload[..], &frame);
    }

    #[test]
    fn test_oversized_frame_truncated() {
        let track = Track::new(
            "t",
            Direction::Publish,
            MediaKind::Audio,
            "m",
            Codec::Opus,
            48_000,
            111,
            1,
        );
        let frame = vec![0x11u8; MAX_PAYLOAD_SIZE + 500];
        let mut packetizer = OpusPacketizer::new();
        let packets = packetizer
            .generate(&track, &NoExtension, &NoExtension, 0, 0, &frame)
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload.len(), MAX_PAYLOAD_SIZE);
    }
}
