//! The fixed 12-byte RTP header (spec.md §4.6, §6). CSRC lists are not
//! supported by this core (`CC` is always written as 0); contributing
//! sources belong to the mixer layer, out of scope here.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use shared::error::{Error, Result};

pub const RTP_VERSION: u8 = 2;
pub const HEADER_LENGTH: usize = 12;

/// `V=2 | P | X | CC=0 | M | PT(7) | seq(16) | ts(32) | ssrc(32)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl Header {
    pub fn marshal_into(&self, buf: &mut BytesMut) {
        let mut b0 = RTP_VERSION << 6;
        if self.padding {
            b0 |= 0x20;
        }
        if self.extension {
            b0 |= 0x10;
        }
        buf.put_u8(b0);

        let mut b1 = self.payload_type & 0x7F;
        if self.marker {
            b1 |= 0x80;
        }
        buf.put_u8(b1);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }

    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH);
        self.marshal_into(&mut buf);
        buf.freeze()
    }

    pub fn unmarshal(buf: &[u8]) -> Result<(Header, usize)> {
        if buf.len() < HEADER_LENGTH {
            return Err(Error::ErrHeaderSizeInsufficient);
        }
        let b0 = buf[0];
        let version = b0 >> 6;
        if version != RTP_VERSION {
            return Err(Error::ErrShortPacket);
        }
        let padding = b0 & 0x20 != 0;
        let extension = b0 & 0x10 != 0;
        let cc = (b0 & 0x0F) as usize;

        let b1 = buf[1];
        let marker = b1 & 0x80 != 0;
        let payload_type = b1 & 0x7F;

        let mut cursor = &buf[2..4];
        let sequence_number = cursor.get_u16();
        let mut cursor = &buf[4..8];
        let timestamp = cursor.get_u32();
        let mut cursor = &buf[8..12];
        let ssrc = cursor.get_u32();

        // CSRC list: 4 bytes per contributing source, skipped but counted.
        let csrc_len = cc * 4;
        let total = HEADER_LENGTH + csrc_len;
        if buf.len() < total {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        Ok((
            Header {
                padding,
                extension,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ssrc,
            },
            total,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let h = Header {
            padding: false,
            extension: true,
            marker: true,
            payload_type: 96,
            sequence_number: 4242,
            timestamp: 0x1234_5678,
            ssrc: 0xDEAD_BEEF,
        };
        let bytes = h.marshal();
        let (parsed, n) = Header::unmarshal(&bytes).unwrap();
        assert_eq!(n, HEADER_LENGTH);
        assert_eq!(parsed, h);
    }

    #[test]
    fn test_header_short_buffer() {
        let buf = [0u8; 8];
        assert!(Header::unmarshal(&buf).is_err());
    }
}
