//! AV1 RTP Packetizer (spec.md §4.7).
//!
//! Walks the encoded low-overhead-bitstream-format OBUs in a frame and
//! splits them across RTP packets, one LEB128-prefixed OBU entry at a time.
//! `W` is always emitted as 0 (every entry length-prefixed) — simpler than
//! tracking the final-entry count optimization, and depacketizers handle
//! both forms (see `packetizer::av1::depacketizer`).

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::packet::Packet;
use crate::packetizer::av1::leb128::write_leb128;
use crate::packetizer::av1::obu::{is_frame_obu_type, is_key_frame_obu, obu_type, parse_obu};
use crate::packetizer::{ExtensionWanter, MAX_PAYLOAD_SIZE, Packetizer};
use crate::track::Track;
use shared::error::Result;

const AV1_Z_MASK: u8 = 0b1000_0000;
const AV1_Y_MASK: u8 = 0b0100_0000;
const AV1_N_MASK: u8 = 0b0000_1000;

#[derive(Debug, Default)]
pub struct Av1Packetizer {
    packet_number: usize,
}

impl Av1Packetizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame_has_key_frame(frame: &[u8]) -> bool {
        let mut offset = 0;
        while offset < frame.len() {
            let Some(obu) = parse_obu(&Bytes::copy_from_slice(&frame[offset..])) else {
                break;
            };
            let consumed = obu_header_and_data_len(&obu);
            if is_frame_obu_type(obu.obu_type) && is_key_frame_obu(&obu.data) {
                return true;
            }
            if consumed == 0 {
                break;
            }
            offset += consumed;
        }
        false
    }
}

fn obu_header_and_data_len(obu: &crate::packetizer::av1::obu::Obu) -> usize {
    // Conservative: we only use this to skip past an OBU we've already
    // parsed via byte scanning in split_obus, not here.
    obu.data.len()
}

/// Splits `frame` into `(header_byte, data)` OBU entries, preserving each
/// OBU's own header/extension bytes inside `data`.
fn split_obus(frame: &[u8]) -> Vec<Bytes> {
    let mut obus = Vec::new();
    let mut offset = 0;
    while offset < frame.len() {
        let first = frame[offset];
        let mut len = 1;
        if first & 0b0000_0100 != 0 {
            len += 1; // extension byte
        }
        if first & 0b0000_0010 != 0 {
            // has_size_field: LEB128 size follows, covers payload only
            let rest = Bytes::copy_from_slice(&frame[offset + len..]);
            let (size, n) = crate::packetizer::av1::leb128::read_leb128(&rest);
            if n == 0 {
                break;
            }
            len += n + size as usize;
        } else {
            // No size field: assume the rest of the buffer is this OBU
            // (only valid for the final OBU in a frame without explicit
            // sizes; well-formed AV1 bitstreams always carry size fields
            // except possibly the last OBU).
            len = frame.len() - offset;
        }
        if offset + len > frame.len() || len == 0 {
            break;
        }
        obus.push(Bytes::copy_from_slice(&frame[offset..offset + len]));
        offset += len;
    }
    obus
}

impl Packetizer for Av1Packetizer {
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
        let is_key_frame = Self::frame_has_key_frame(frame);
        let max_payload = MAX_PAYLOAD_SIZE.saturating_sub(media_protection_overhead);

        let obus = split_obus(frame);
        let mut packets = Vec::new();
        let mut i = 0;
        let mut first_packet = true;

        while i < obus.len() || (i == 0 && obus.is_empty()) {
            let mut payload = BytesMut::with_capacity(max_payload);
            payload.put_u8(0); // placeholder aggregation header
            let mut continuation = false;
            let mut split_last = false;

            while i < obus.len() {
                let obu = &obus[i];
                let mut entry = BytesMut::new();
                write_leb128(&mut entry, obu.len() as u32);
                entry.put_slice(obu);

                if payload.len() + entry.len() <= max_payload || payload.len() == 1 {
                    let room = max_payload.saturating_sub(payload.len());
                    if entry.len() <= room {
                        payload.put_slice(&entry);
                        i += 1;
                        continue;
                    }
                    // OBU too large for a single packet: fragment it.
                    let header_len = write_leb128_len(obu.len() as u32);
                    let avail = room.saturating_sub(header_len);
                    if avail == 0 {
                        break;
                    }
                    let (head, _tail) = obu.split_at(avail.min(obu.len()));
                    let mut frag = BytesMut::new();
                    write_leb128(&mut frag, head.len() as u32);
                    frag.put_slice(head);
                    payload.put_slice(&frag);
                    split_last = true;
                    break;
                }
                break;
            }

            let obu_count: u8 = 0; // always W=0
            let n_bit = first_packet && is_key_frame;
            let z_bit = continuation;
            let y_bit = split_last;
            payload[0] = (if z_bit { AV1_Z_MASK } else { 0 })
                | (if y_bit { AV1_Y_MASK } else { 0 })
                | (obu_count << 4)
                | (if n_bit { AV1_N_MASK } else { 0 });

            let marker = i >= obus.len() && !split_last;
            let (rollover, seq) = track.rtp_packet_source.lock().unwrap().next_sequence();

            let extension = {
                let wants_sim = simulcast_ext.wants(track, is_key_frame, self.packet_number);
                let wants_twcc = twcc_ext.wants(track, is_key_frame, self.packet_number);
                if wants_sim || wants_twcc {
                    Some(crate::extension::ExtensionBuilder::new().build())
                } else {
                    None
                }
            };

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
            first_packet = false;

            if obus.is_empty() || (i >= obus.len() && !split_last) {
                break;
            }
        }

        Ok(packets)
    }
}

fn write_leb128_len(mut v: u32) -> usize {
    let mut n = 0;
    loop {
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packetizer::NoExtension;
    use crate::track::{Codec, Direction, MediaKind};

    #[test]
    fn test_single_small_frame_produces_one_packet() {
        let track = Track::new(
            "t",
            Direction::Publish,
            MediaKind::Video,
            "m",
            Codec::Av1,
            90_000,
            96,
            1,
        );
        let mut packetizer = Av1Packetizer::new();
        // One OBU: type=6 (Frame), has_size_field, size=3
        let frame = [0b0011_0010u8, 0x03, 0x01, 0x02, 0x03];
        let packets = packetizer
            .generate(&track, &NoExtension, &NoExtension, 0, 0, &frame)
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert!(packets[0].marker);
    }
}
