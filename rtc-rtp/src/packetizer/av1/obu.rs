//! AV1 Open Bitstream Unit (OBU) parsing (spec.md §4.2).
//!
//! OBU header: `obu_forbidden_bit(1) | obu_type(4) | obu_extension_flag(1) |
//! obu_has_size_field(1) | obu_reserved_1bit(1)`, optionally followed by a
//! one-byte extension header when `obu_extension_flag` is set.

use bytes::Bytes;

use crate::packetizer::av1::leb128::read_leb128;

pub const OBU_TYPE_MASK: u8 = 0b0111_1000;
pub const OBU_EXTENSION_FLAG_BIT: u8 = 0b0000_0100;
pub const OBU_HAS_SIZE_BIT: u8 = 0b0000_0010;

pub const OBU_TYPE_SEQUENCE_HEADER: u8 = 1;
pub const OBU_TYPE_TEMPORAL_DELIMITER: u8 = 2;
pub const OBU_TYPE_FRAME_HEADER: u8 = 3;
pub const OBU_TYPE_TILE_GROUP: u8 = 4;
pub const OBU_TYPE_METADATA: u8 = 5;
pub const OBU_TYPE_FRAME: u8 = 6;
pub const OBU_TYPE_REDUNDANT_FRAME_HEADER: u8 = 7;
pub const OBU_TYPE_TILE_LIST: u8 = 8;
pub const OBU_TYPE_PADDING: u8 = 15;

/// A single parsed OBU's metadata and (sub-slice) payload.
#[derive(Debug, Clone)]
pub struct Obu {
    pub obu_type: u8,
    pub temporal_id: u8,
    pub spatial_id: u8,
    pub data: Bytes,
}

pub fn obu_type(first_byte: u8) -> u8 {
    (first_byte & OBU_TYPE_MASK) >> 3
}

pub fn has_extension(first_byte: u8) -> bool {
    first_byte & OBU_EXTENSION_FLAG_BIT != 0
}

pub fn has_size_field(first_byte: u8) -> bool {
    first_byte & OBU_HAS_SIZE_BIT != 0
}

/// True for OBU types that carry per-frame information relevant to
/// key-frame detection (spec.md §4.2).
pub fn is_frame_obu_type(t: u8) -> bool {
    t == OBU_TYPE_FRAME || t == OBU_TYPE_FRAME_HEADER || t == OBU_TYPE_REDUNDANT_FRAME_HEADER
}

/// Reads the first bits of a frame/frame-header OBU to determine whether it
/// carries a key frame (spec.md §4.2). `obu` must already have the OBU
/// header (and optional extension byte, and optional LEB128 size field)
/// stripped by the caller, i.e. point at the frame-header bitstream.
pub fn is_key_frame_obu(frame_header: &[u8]) -> bool {
    if frame_header.is_empty() {
        return false;
    }
    // show_existing_frame: 1 bit. If set, this references a previously
    // decoded frame and is never itself a key frame.
    let show_existing_frame = frame_header[0] & 0x80 != 0;
    if show_existing_frame {
        return false;
    }
    // frame_type: 2 bits, immediately following show_existing_frame.
    // KEY_FRAME == 0.
    let frame_type = (frame_header[0] >> 5) & 0x03;
    frame_type == 0
}

/// Parses the OBU at the start of `payload`, stripping any optional size
/// field so `data` is the raw OBU payload. Mirrors the leb128-driven size
/// handling the AV1 depacketizer performs inline.
pub fn parse_obu(payload: &Bytes) -> Option<Obu> {
    if payload.is_empty() {
        return None;
    }
    let first = payload[0];
    let t = obu_type(first);
    let mut offset = 1;
    let mut temporal_id = 0;
    let mut spatial_id = 0;
    if has_extension(first) {
        if payload.len() <= offset {
            return None;
        }
        let ext = payload[offset];
        temporal_id = (ext >> 5) & 0x07;
        spatial_id = (ext >> 3) & 0x03;
        offset += 1;
    }
    let data = if has_size_field(first) {
        let rest = payload.slice(offset..);
        let (size, n) = read_leb128(&rest);
        if n == 0 || offset + n + size as usize > payload.len() {
            return None;
        }
        payload.slice(offset + n..offset + n + size as usize)
    } else {
        payload.slice(offset..)
    };

    Some(Obu {
        obu_type: t,
        temporal_id,
        spatial_id,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_frame_obu_detection() {
        // show_existing_frame=0, frame_type=0 (KEY_FRAME) in top 3 bits.
        assert!(is_key_frame_obu(&[0b0000_0000]));
        // frame_type=1 (INTER_FRAME).
        assert!(!is_key_frame_obu(&[0b0010_0000]));
        // show_existing_frame=1.
        assert!(!is_key_frame_obu(&[0b1000_0000]));
    }

    #[test]
    fn test_parse_obu_without_size_field() {
        let payload = Bytes::from_static(&[0b0011_0000, 0x01, 0x02]);
        let obu = parse_obu(&payload).unwrap();
        assert_eq!(obu.obu_type, OBU_TYPE_FRAME);
        assert_eq!(&obu.data[..], &[0x01, 0x02]);
    }

    #[test]
    fn test_parse_obu_with_size_field() {
        // type=6 (Frame), has_size_field set, size=2, payload [0xAA,0xBB]
        let payload = Bytes::from_static(&[0b0011_0010, 0x02, 0xAA, 0xBB]);
        let obu = parse_obu(&payload).unwrap();
        assert_eq!(&obu.data[..], &[0xAA, 0xBB]);
    }
}
