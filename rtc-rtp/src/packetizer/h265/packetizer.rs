//! H.265 RTP Packetizer (RFC 7798, spec.md §4.7).

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::packet::Packet;
use crate::packetizer::h265::nalu::{self, NaluParser};
use crate::packetizer::{ExtensionWanter, MAX_PAYLOAD_SIZE, Packetizer};
use crate::track::Track;
use shared::error::Result;

const AP_TYPE: u8 = 48;
const FU_TYPE: u8 = 49;

fn nal_header(nalu_type: u8, layer_id: u8, tid: u8) -> [u8; 2] {
    [(nalu_type << 1) & 0x7E, ((layer_id & 0x3F) << 3) | (tid & 0x07)]
}

#[derive(Debug, Default)]
pub struct H265Packetizer {
    vps: Option<Bytes>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    packet_number: usize,
}

impl H265Packetizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Packetizer for H265Packetizer {
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
            let (rollover, seq) = track.rtp_packet_source.lock().unwrap().next_sequence();
            let wants_ext = simulcast_ext.wants(track, false, this.packet_number)
                || twcc_ext.wants(track, false, this.packet_number);
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
                nalu::NALU_TYPE_VPS => {
                    self.vps = Some(Bytes::copy_from_slice(data));
                    continue;
                }
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
                if let (Some(vps), Some(sps), Some(pps)) = (&self.vps, &self.sps, &self.pps) {
                    let mut ap = BytesMut::with_capacity(
                        2 + 2 + vps.len() + 2 + sps.len() + 2 + pps.len(),
                    );
                    ap.put_slice(&nal_header(AP_TYPE, 0, 0));
                    for unit in [vps, sps, pps] {
                        ap.put_u16(unit.len() as u16);
                        ap.put_slice(unit);
                    }
                    push(&mut packets, self, track, ap.freeze(), false);
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

            // FU fragmentation: 2-byte NAL header (type=49) + 1-byte FU
            // header (S|E|type(6)).
            let layer_id = (data[1] >> 3) & 0x3F;
            let tid = data[1] & 0x07;
            let nal_hdr = nal_header(FU_TYPE, layer_id, tid);
            let nalu_payload = &data[2..];
            let fragment_capacity = max_payload - 3;

            let mut offset = 0;
            let mut first = true;
            while offset < nalu_payload.len() {
                let end = (offset + fragment_capacity).min(nalu_payload.len());
                let is_last_fragment = end == nalu_payload.len();

                let mut fu = BytesMut::with_capacity(3 + (end - offset));
                fu.put_slice(&nal_hdr);
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
    fn test_vps_sps_pps_idr_produces_ap_then_fragments() {
        let track = Track::new(
            "t",
            Direction::Publish,
            MediaKind::Video,
            "m",
            Codec::H265,
            90_000,
            96,
            1,
        );
        let vps = [32u8 << 1, 0x01, 0xAA];
        let sps = [33u8 << 1, 0x01, 0xBB];
        let pps = [34u8 << 1, 0x01, 0xCC];
        let mut idr_payload = vec![0x80u8]; // first_slice_segment_in_pic_flag
        idr_payload.extend(vec![0xDDu8; 3000]);
        let mut idr = vec![19u8 << 1, 0x01];
        idr.extend_from_slice(&idr_payload);

        let frame = annex_b(&[&vps, &sps, &pps, &idr]);
        let mut packetizer = H265Packetizer::new();
        let packets = packetizer
            .generate(&track, &NoExtension, &NoExtension, 0, 0, &frame)
            .unwrap();

        assert!(packets.len() > 2);
        assert_eq!((packets[0].payload[0] & 0x7E) >> 1, AP_TYPE);
        assert!(packets.last().unwrap().marker);
    }
}
