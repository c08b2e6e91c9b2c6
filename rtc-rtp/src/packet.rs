//! RtpPacket: serialise/parse the wire format, including RTX re-wrap
//! (spec.md §4.6, §6).

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::extension::{
    convert_one_to_two_byte, RtpExtension, ONE_BYTE_EXTENSION_PROFILE_ID,
    TWO_BYTE_EXTENSION_PROFILE_ID,
};
use crate::header::{Header, HEADER_LENGTH};
use crate::track::Track;
use log::trace;

/// An immutable, ready-to-send (or just-parsed) RTP packet. Built by a
/// Packetizer; consumed by the wire serialiser (spec.md §3).
#[derive(Debug, Clone)]
pub struct Packet {
    pub track: Arc<Track>,
    pub marker: bool,
    pub rollover: u32,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub padding: u8,
    pub extension: Option<RtpExtension>,
    pub payload: Bytes,
}

impl Packet {
    /// Serialises the packet to wire bytes. Returns the bytes plus the
    /// rollover counter the caller should associate with this send, per
    /// spec.md §4.6.
    pub fn generate(&self) -> (Bytes, u32) {
        let header = Header {
            padding: self.padding > 0,
            extension: self.extension.as_ref().is_some_and(|e| !e.is_empty()),
            marker: self.marker,
            payload_type: self.track.payload_type,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp,
            ssrc: self.track.ssrc,
        };

        let ext_bytes = self
            .extension
            .as_ref()
            .filter(|e| !e.is_empty())
            .map(|e| e.marshal())
            .unwrap_or_default();

        let mut buf = BytesMut::with_capacity(
            HEADER_LENGTH + ext_bytes.len() + self.payload.len() + self.padding as usize,
        );
        header.marshal_into(&mut buf);
        buf.put_slice(&ext_bytes);
        buf.put_slice(&self.payload);
        if self.padding > 0 {
            for _ in 0..self.padding - 1 {
                buf.put_u8(0);
            }
            buf.put_u8(self.padding);
        }

        (buf.freeze(), self.rollover)
    }

    /// Wraps this packet for retransmission per RFC 4588: payload type and
    /// SSRC switch to the RTX channel, the original 16-bit sequence number
    /// is prepended to the payload, and the timestamp/padding are preserved.
    pub fn generate_rtx(&self, extension: Option<RtpExtension>) -> Option<Bytes> {
        let rtx_pt = self.track.rtx_payload_type?;
        let rtx_ssrc = self.track.rtx_ssrc?;

        let (rtx_rollover, rtx_seq) = self.track.rtx_packet_source.lock().unwrap().next_sequence();
        let _ = rtx_rollover;

        let header = Header {
            padding: self.padding > 0,
            extension: extension.as_ref().is_some_and(|e| !e.is_empty()),
            marker: self.marker,
            payload_type: rtx_pt,
            sequence_number: rtx_seq,
            timestamp: self.timestamp,
            ssrc: rtx_ssrc,
        };

        let ext_bytes = extension
            .as_ref()
            .filter(|e| !e.is_empty())
            .map(|e| e.marshal())
            .unwrap_or_default();

        let mut buf = BytesMut::with_capacity(
            HEADER_LENGTH + ext_bytes.len() + 2 + self.payload.len() + self.padding as usize,
        );
        header.marshal_into(&mut buf);
        buf.put_slice(&ext_bytes);
        buf.put_u16(self.sequence_number);
        buf.put_slice(&self.payload);
        if self.padding > 0 {
            for _ in 0..self.padding - 1 {
                buf.put_u8(0);
            }
            buf.put_u8(self.padding);
        }

        Some(buf.freeze())
    }

    /// Parses `bytes` against `track`'s primary or RTX channel. Returns
    /// `None` for any malformed input (too short, inconsistent extension
    /// length, padding count exceeding payload) per spec.md §4.6's
    /// "drop, don't propagate" error policy (§7).
    pub fn from_udp_packet(track: &Arc<Track>, bytes: &[u8]) -> Option<Packet> {
        let (header, mut offset) = Header::unmarshal(bytes).ok()?;

        let is_rtx = track.matches_rtx(header.ssrc, header.payload_type);
        if !is_rtx && !track.matches_primary(header.ssrc, header.payload_type) {
            trace!(
                "dropping packet for ssrc={} pt={}: matches neither primary nor rtx channel of track {}",
                header.ssrc, header.payload_type, track.id
            );
            return None;
        }

        let mut extension = None;
        if header.extension {
            if bytes.len() < offset + 4 {
                return None;
            }
            let ext_id = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
            let ext_words = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
            let ext_len = ext_words * 4;
            offset += 4;
            if bytes.len() < offset + ext_len {
                return None;
            }
            let raw = &bytes[offset..offset + ext_len];
            offset += ext_len;

            extension = match ext_id {
                ONE_BYTE_EXTENSION_PROFILE_ID => {
                    let converted = convert_one_to_two_byte(raw).ok()?;
                    Some(RtpExtension {
                        id: TWO_BYTE_EXTENSION_PROFILE_ID,
                        data: converted,
                    })
                }
                TWO_BYTE_EXTENSION_PROFILE_ID => Some(RtpExtension {
                    id: ext_id,
                    data: Bytes::copy_from_slice(raw),
                }),
                _ => Some(RtpExtension {
                    id: ext_id,
                    data: Bytes::copy_from_slice(raw),
                }),
            };
        }

        let mut payload_end = bytes.len();
        if header.padding {
            let pad_count = *bytes.last()? as usize;
            if pad_count == 0 || offset + pad_count > payload_end {
                return None;
            }
            payload_end -= pad_count;
        }
        if offset > payload_end {
            return None;
        }

        let payload = Bytes::copy_from_slice(&bytes[offset..payload_end]);
        let padding = if header.padding {
            (bytes.len() - payload_end) as u8
        } else {
            0
        };

        let (rollover, _) = if is_rtx {
            track.rtx_packet_source.lock().unwrap().current_sequence()
        } else {
            track.rtp_packet_source.lock().unwrap().current_sequence()
        };

        Some(Packet {
            track: Arc::clone(track),
            marker: header.marker,
            rollover,
            sequence_number: header.sequence_number,
            timestamp: header.timestamp,
            padding,
            extension,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{Codec, Direction, MediaKind, Track};

    fn test_track() -> Arc<Track> {
        Track::new(
            "t1",
            Direction::Publish,
            MediaKind::Video,
            "m1",
            Codec::Vp8,
            90_000,
            96,
            0x1111_1111,
        )
    }

    #[test]
    fn test_generate_and_parse_roundtrip() {
        let track = test_track();
        let packet = Packet {
            track: Arc::clone(&track),
            marker: true,
            rollover: 0,
            sequence_number: 100,
            timestamp: 12345,
            padding: 0,
            extension: None,
            payload: Bytes::from_static(b"hello"),
        };
        let (bytes, _) = packet.generate();
        let parsed = Packet::from_udp_packet(&track, &bytes).unwrap();
        assert_eq!(parsed.sequence_number, 100);
        assert_eq!(parsed.timestamp, 12345);
        assert!(parsed.marker);
        assert_eq!(parsed.payload, Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_padding_stripped_on_parse() {
        let track = test_track();
        let packet = Packet {
            track: Arc::clone(&track),
            marker: false,
            rollover: 0,
            sequence_number: 1,
            timestamp: 1,
            padding: 4,
            extension: None,
            payload: Bytes::from_static(b"data"),
        };
        let (bytes, _) = packet.generate();
        let parsed = Packet::from_udp_packet(&track, &bytes).unwrap();
        assert_eq!(parsed.payload, Bytes::from_static(b"data"));
    }

    #[test]
    fn test_rejects_mismatched_ssrc() {
        let track = test_track();
        let other = Track::new(
            "t2",
            Direction::Publish,
            MediaKind::Video,
            "m2",
            Codec::Vp8,
            90_000,
            96,
            0x2222_2222,
        );
        let packet = Packet {
            track: Arc::clone(&track),
            marker: false,
            rollover: 0,
            sequence_number: 1,
            timestamp: 1,
            padding: 0,
            extension: None,
            payload: Bytes::from_static(b"x"),
        };
        let (bytes, _) = packet.generate();
        assert!(Packet::from_udp_packet(&other, &bytes).is_none());
    }

    #[test]
    fn test_too_short_rejected() {
        let track = test_track();
        assert!(Packet::from_udp_packet(&track, &[0u8; 4]).is_none());
    }
}
