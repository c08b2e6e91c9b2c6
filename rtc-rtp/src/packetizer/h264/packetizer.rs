//! H.264 RTP Packetizer (RFC 6184, spec.md §4.7).

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::packet::Packet;
use crate::packetizer::h264::nalu::{self, NaluParser};
use crate::packetizer::{ExtensionWanter, MAX_PAYLOAD_SIZE, Packetizer};
use crate::track::Track;
use shared::error::Result;

const STAP_A_TYPE: u8 = 24;
const FU_A_TYPE: u8 = 28;

#[derive(Debug, Default)]
pub struct H264Packetizer {
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    packet_number: usize,
}

impl H264Packetizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Packetizer for H264Packetizer {
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

        let units: Vec<_> = NaluParser::new(frame).collect();
        let mut packets = Vec::new();
        let mut key_frame_handled = false;

        let push = |packets: &mut Vec<Packet>,
                    this: &mut Self,
                    track: &Arc<Track>,
                    payload: Bytes,
                    marker: bool| {
            let is_key = false;
            let (rollover, seq) = track.rtp_packet_source.lock().unwrap().next_sequence();
            let wants_ext = simulcast_ext.wants(track, is_key, this.packet_number)
                || twcc_ext.wants(track, is_key, this.packet_number);
            let extension = wants_ext.then(|| crate::extension::ExtensionBuilder::new().build());
            packets.push(Packet {
                track: Arc::clone(track),
                marker,
                rollover,
                sequence_number: seq,
                timestamp: frame_timestamp,
                padding: 0,
                extension,
                payload,
            });
            this.packet_number += 1;
        };

        for (idx, unit) in units.iter().enumerate() {
            let data = &frame[unit.start..unit.end];
            let t = nalu::nalu_type(data[0]);
            let is_last_nalu = idx == units.len() - 1;

            match t {
                nalu::NALU_TYPE_SPS => {
                    self.sps = Some(Bytes::copy_from_slice(data));
                    continue;
                }
                nalu::NALU_TYPE_PPS => {
                    self.pps = Some(Bytes::copy_from_slice(data));
                    continue;
                }
                _ => {}
            }

            if nalu::is_key_frame(t) && !key_frame_handled {
                key_frame_handled = true;
                if let (Some(sps), Some(pps)) = (&self.sps, &self.pps) {
                    let nri = nalu::nri(sps[0]).max(nalu::nri(pps[0]));
                    let mut stap = BytesMut::with_capacity(1 + 2 + sps.len() + 2 + pps.len());
                    stap.put_u8(nri | STAP_A_TYPE);
                    stap.put_u16(sps.len() as u16);
                    stap.put_slice(sps);
                    stap.put_u16(pps.len() as u16);
                    stap.put_slice(pps);
                    push(&mut packets, self, track, stap.freeze(), false);
                }
            }

            if data.len() <= max_payload {
                push(
                    &mut packets,
                    self,
                    track,
                    Bytes::copy_from_slice(data),
                    is_last_nalu,
                );
                continue;
            }

            // FU-A fragmentation.
            let nri = nalu::nri(data[0]);
            let mut packet_size = max_payload;
            let nalu_payload = &data[1..];
            let fragment_capacity = packet_size - 2;
            let remainder = nalu_payload.len() % fragment_capacity;
            if remainder != 0 && nalu_payload.len() - remainder == fragment_capacity {
                // Shrink so the final fragment cannot be forced to carry
                // both S and E (spec.md §4.7 edge case).
                packet_size -= 10;
            }
            let fragment_capacity = packet_size - 2;

            let mut offset = 0;
            let mut first = true;
            while offset < nalu_payload.len() {
                let end = (offset + fragment_capacity).min(nalu_payload.len());
                let is_last_fragment = end == nalu_payload.len();
                let mut fu = BytesMut::with_capacity(2 + (end - offset));
                fu.put_u8(nri | FU_A_TYPE);
                let mut fu_header = t;
                if first {
                    fu_header |= 0x80;
                }
                if is_last_fragment {
                    fu_header |= 0x40;
                }
                fu.put_u8(fu_header);
                fu.put_slice(&nalu_payload[offset..end]);

                push(
                    &mut packets,
                    self,
                    track,
                    fu.freeze(),
                    is_last_fragment && is_last_nalu,
                );

                offset = end;
                first = false;
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

    fn annex_b(units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for u in units {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(u);
        }
        out
    }

    #[test]
    fn test_sps_pps_idr_produces_stap_a_then_fragments() {
        let track = Track::new(
            "t",
            Direction::Publish,
            MediaKind::Video,
            "m",
            Codec::H264,
            90_000,
            96,
            1,
        );
        let sps = [0x67u8, 0x20];
        let pps = [0x68u8, 0x20];
        let idr_payload = vec![0x05u8; 4000];
        let mut idr = vec![0x65u8];
        idr.extend_from_slice(&idr_payload);

        let frame = annex_b(&[&sps, &pps, &idr]);
        let mut packetizer = H264Packetizer::new();
        let packets = packetizer
            .generate(&track, &NoExtension, &NoExtension, 0, 0, &frame)
            .unwrap();

        assert!(packets.len() > 2);
        assert_eq!(packets[0].payload[0] & 0x1F, 24); // STAP-A
        assert!(packets.last().unwrap().marker);
        assert!(!packets[packets.len() - 2].marker);
    }
}
