//! RTP header extensions: one-byte (RFC 5285 §4.2) and two-byte (RFC 5285
//! §4.3) profiles, plus the Google VLA (video layer allocation) simulcast
//! extension (spec.md §4.5, §6).

use bytes::{BufMut, Bytes, BytesMut};
use log::warn;

use shared::error::{Error, Result};

pub const ONE_BYTE_EXTENSION_PROFILE_ID: u16 = 0xBEDE;
pub const TWO_BYTE_EXTENSION_PROFILE_ID: u16 = 0x1000;

/// A single header extension block: `{id, data}`. Empty when `id == 0` or
/// `data` is empty. The canonical in-memory form is always the two-byte
/// profile; one-byte extensions are converted to this form on ingress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtpExtension {
    pub id: u16,
    pub data: Bytes,
}

impl RtpExtension {
    pub fn is_empty(&self) -> bool {
        self.id == 0 || self.data.is_empty()
    }

    /// Serialises as `u16 id | u16 length_in_32bit_words | data | zero-pad`.
    pub fn marshal(&self) -> Bytes {
        if self.is_empty() {
            return Bytes::new();
        }
        let padded_len = (self.data.len() + 3) / 4 * 4;
        let mut buf = BytesMut::with_capacity(4 + padded_len);
        buf.put_u16(self.id);
        buf.put_u16((padded_len / 4) as u16);
        buf.put_slice(&self.data);
        for _ in self.data.len()..padded_len {
            buf.put_u8(0);
        }
        buf.freeze()
    }
}

/// Accumulates two-byte-id TLVs for a single RtpExtension block
/// (spec.md §4.5).
#[derive(Debug, Default, Clone)]
pub struct ExtensionBuilder {
    entries: Vec<(u8, Bytes)>,
}

impl ExtensionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: u8) -> bool {
        self.entries.iter().any(|(eid, _)| *eid == id)
    }

    pub fn with_string_value(mut self, id: u8, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.truncate(255);
        self.entries.push((id, Bytes::from(bytes)));
        self
    }

    pub fn with_u16_value(mut self, id: u8, value: u16) -> Self {
        let mut buf = BytesMut::with_capacity(2);
        buf.put_u16(value);
        self.entries.push((id, buf.freeze()));
        self
    }

    pub fn with_u32_value(mut self, id: u8, value: u32) -> Self {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u32(value);
        self.entries.push((id, buf.freeze()));
        self
    }

    pub fn with_binary_value(mut self, id: u8, value: &[u8]) -> Self {
        let mut bytes = value.to_vec();
        bytes.truncate(255);
        self.entries.push((id, Bytes::from(bytes)));
        self
    }

    /// Adds a Google VLA (video layer allocation) blob per the simulcast
    /// draft referenced by spec.md §6.
    pub fn with_google_vla(mut self, id: u8, rid_id: u8, layers: &[VlaLayer]) -> Self {
        let n = layers.len().clamp(1, 4) as u8;
        let mut buf = BytesMut::new();
        buf.put_u8((rid_id << 6) | ((n - 1) << 4) | 0x01);
        buf.put_u8(0);
        for layer in layers {
            let mut leb = crate::bitio::ByteWriter::new();
            leb.write_leb128(layer.target_kbps);
            buf.put_slice(&leb.freeze());
        }
        for layer in layers {
            buf.put_u16(layer.width.saturating_sub(1));
            buf.put_u16(layer.height.saturating_sub(1));
            buf.put_u8(layer.fps);
        }
        self.entries.push((id, buf.freeze()));
        self
    }

    /// Builds the final RtpExtension, in two-byte canonical form, or an
    /// empty extension if nothing was added.
    pub fn build(self) -> RtpExtension {
        if self.entries.is_empty() {
            return RtpExtension::default();
        }
        let mut buf = BytesMut::new();
        for (id, data) in &self.entries {
            buf.put_u8(*id);
            buf.put_u8(data.len() as u8);
            buf.put_slice(data);
        }
        RtpExtension {
            id: TWO_BYTE_EXTENSION_PROFILE_ID,
            data: buf.freeze(),
        }
    }
}

/// A single layer entry for the Google VLA extension.
#[derive(Debug, Clone, Copy)]
pub struct VlaLayer {
    pub target_kbps: u32,
    pub width: u16,
    pub height: u16,
    pub fps: u8,
}

/// Converts a one-byte profile (0xBEDE) extension payload to the canonical
/// two-byte form, per spec.md §4.5. Entries are `(id:4, len:4)` followed by
/// `len+1` bytes of value; zero bytes between entries are padding and are
/// skipped. Id `0x0F` is reserved; encountering it aborts the remainder of
/// the conversion (spec.md §9 — preserved deliberately, loses trailing
/// entries when 0x0F appears).
pub fn convert_one_to_two_byte(src: &[u8]) -> Result<Bytes> {
    let mut out = BytesMut::new();
    let mut i = 0;
    while i < src.len() {
        let b = src[i];
        if b == 0 {
            i += 1;
            continue;
        }
        let id = (b & 0xF0) >> 4;
        let len = (b & 0x0F) as usize + 1;
        if id == 0x0F {
            warn!("one-byte extension block hit reserved id 0x0F, dropping remaining entries");
            break;
        }
        i += 1;
        if i + len > src.len() {
            return Err(Error::ErrHeaderSizeInsufficientForExtension);
        }
        out.put_u8(id);
        out.put_u8(len as u8);
        out.put_slice(&src[i..i + len]);
        i += len;
    }
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_empty_when_nothing_added() {
        let ext = ExtensionBuilder::new().build();
        assert!(ext.is_empty());
    }

    #[test]
    fn test_builder_two_byte_profile() {
        let ext = ExtensionBuilder::new()
            .with_u16_value(1, 0x1111)
            .with_u32_value(2, 0x2222_2222)
            .build();
        assert_eq!(ext.id, TWO_BYTE_EXTENSION_PROFILE_ID);
        assert!(!ext.is_empty());
        assert!(!ext.marshal().is_empty());
    }

    #[test]
    fn test_convert_one_to_two_byte() {
        // one-byte entries: (1, u16 0x1111), (2, u32 0x2222_2222), (3, "abc")
        let mut src = Vec::new();
        src.push((1 << 4) | 1); // id=1, len=2
        src.extend_from_slice(&0x1111u16.to_be_bytes());
        src.push((2 << 4) | 3); // id=2, len=4
        src.extend_from_slice(&0x2222_2222u32.to_be_bytes());
        src.push((3 << 4) | 2); // id=3, len=3
        src.extend_from_slice(b"abc");

        let two_byte = convert_one_to_two_byte(&src).unwrap();
        assert_eq!(two_byte[0], 1);
        assert_eq!(two_byte[1], 2);
        assert_eq!(&two_byte[2..4], &0x1111u16.to_be_bytes());
    }

    #[test]
    fn test_convert_one_to_two_byte_stops_at_reserved_id() {
        let mut src = vec![(0x0F << 4) | 1, 0, 0];
        src.extend_from_slice(&[(1 << 4) | 0, 0xAB]);
        let two_byte = convert_one_to_two_byte(&src).unwrap();
        assert!(two_byte.is_empty());
    }
}
