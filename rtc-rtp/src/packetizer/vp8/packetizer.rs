//! VP8 RTP Packetizer (RFC 7741, spec.md §4.7).

use std::sync::Arc;

use bytes::BytesMut;

use crate::packet::Packet;
use crate::packetizer::{ExtensionWanter, MAX_PAYLOAD_SIZE, Packetizer};
use crate::track::Track;
use shared::error::Result;

/// VP8 key frames start with a 3-byte uncompressed tag whose low bit of the
/// first byte is 0 for key frames (RFC 7741 §9.1, spec.md §4.2).
fn is_key_frame(frame: &[u8]) -> bool {
    frame.len() >= 3 && frame[0] & 0x01 == 0
}

#[derive(Debug, Default)]
pub struct Vp8Packetizer {
    packet_number: usize,
    picture_id: u16,
}

impl Vp8Packetizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Packetizer for Vp8Packetizer {
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
        let is_key = is_key_frame(frame);
        let max_payload = MAX_PAYLOAD_SIZE
            .saturating_sub(media_protection_overhead)
            .saturating_sub(1); // 1-byte descriptor, S/PID only

        self.picture_id = self.picture_id.wrapping_add(1);

        let mut packets = Vec::new();
        let mut offset = 0;
        let mut first = true;

        while offset < frame.len() || (first && frame.is_empty()) {
            let end = (offset + max_payload.max(1)).min(frame.len());

            let mut payload = BytesMut::with_capacity(1 + (end - offset));
            let descriptor: u8 = if first { 0x10 } else { 0x00 }; // S=1 on first packet, PID=0
            payload.extend_from_slice(&[descriptor]);
            payload.extend_from_slice(&frame[offset..end]);

            let marker = end == frame.len();
            let (rollover, seq) = track.rtp_packet_source.lock().unwrap().next_sequence();
            let wants_ext = simulcast_ext.wants(track, is_key, self.packet_number)
                || twcc_ext.wants(track, is_key, self.packet_number);
            let extension = wants_ext.then(|| crate::extension::ExtensionBuilder::new().build());

            packets.push(Packet {
                track: Arc::clone(track),
                marker,
                rollover,
                sequence_number: seq,
                timestamp: frame_timestamp,
                padding: 0,
                extension,
                payload: payload.freeze(),
            });

            self.packet_number += 1;
            first = false;
            offset = end;
            if frame.is_empty() {
                break;
            }
        }

        Ok(packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packetizer::NoExtension;
    use crate::track::{Codec, Direction, MediaKind};

    #[test]
    fn test_small_key_frame_one_packet_s_bit_set() {
        let track = Track::new(
            "t",
            Direction::Publish,
            MediaKind::Video,
            "m",
            Codec::Vp8,
            90_000,
            96,
            1,
        );
        let frame = [0x10u8, 0x00, 0x00, 0xAA, 0xBB];
        let mut packetizer = Vp8Packetizer::new();
        let packets = packetizer
            .generate(&track, &NoExtension, &NoExtension, 0, 0, &frame)
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload[0] & 0x10, 0x10);
        assert!(packets[0].marker);
    }

    #[test]
    fn test_large_frame_fragments_with_s_bit_only_on_first() {
        let track = Track::new(
            "t",
            Direction::Publish,
            MediaKind::Video,
            "m",
            Codec::Vp8,
            90_000,
            96,
            1,
        );
        let frame = vec![0xAAu8; 4000];
        let mut packetizer = Vp8Packetizer::new();
        let packets = packetizer
            .generate(&track, &NoExtension, &NoExtension, 0, 0, &frame)
            .unwrap();
        assert!(packets.len() > 1);
        assert_eq!(packets[0].payload[0] & 0x10, 0x10);
        assert_eq!(packets[1].payload[0] & 0x10, 0x00);
        assert!(packets.last().unwrap().marker);
    }
}
