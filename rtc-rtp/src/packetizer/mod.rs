//! Shared packetizer/depacketizer contracts (spec.md §4.7, §4.8, §9).
//!
//! Per spec.md §9 ("Polymorphism for codecs"), codec variants are dispatched
//! through a tagged enum (`AnyPacketizer`/`AnyDepacketizer`) rather than
//! trait objects, so there is no virtual-call chain on the hot path; each
//! concrete codec type still implements the shared `Packetizer`/
//! `Depacketizer` traits so it can be tested and used standalone.

pub mod av1;
pub mod h264;
pub mod h265;
pub mod opus;
pub mod vp8;

use std::sync::Arc;

use bytes::Bytes;

use shared::error::{Error, Result};

use crate::packet::Packet;
use crate::track::{Codec, Track};

/// Maximum RTP payload size before SRTP/extension/framing overhead
/// (spec.md §4.7).
pub const MAX_PAYLOAD_SIZE: usize = 1200;

/// Shared vocabulary for how a received packet participates in a frame
/// (spec.md §3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Standalone,
    Start,
    Middle,
    End,
}

/// Lets a packetizer ask whether an out-of-band extension (simulcast layer
/// allocation, TWCC sequence) should be attached to the packet currently
/// being built (spec.md §4.7).
pub trait ExtensionWanter {
    fn wants(&self, track: &Arc<Track>, is_key_frame: bool, packet_number: usize) -> bool;
}

/// A wanter that never requests the extension; used when a caller has no
/// simulcast or TWCC extension to offer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExtension;

impl ExtensionWanter for NoExtension {
    fn wants(&self, _track: &Arc<Track>, _is_key_frame: bool, _packet_number: usize) -> bool {
        false
    }
}

/// Frame -> ordered RtpPackets, obeying the relevant RFC's fragmentation
/// rules (spec.md §4.7).
pub trait Packetizer {
    fn generate(
        &mut self,
        track: &Arc<Track>,
        simulcast_ext: &dyn ExtensionWanter,
        twcc_ext: &dyn ExtensionWanter,
        media_protection_overhead: usize,
        pts_usec: i64,
        frame: &[u8],
    ) -> Result<Vec<Packet>>;
}

/// Decides packet kind and reassembles fragments into decoder-ready units
/// (spec.md §4.8). `packet_kind` has a single definition shared by every
/// codec in terms of `is_partition_head`/`is_partition_tail`, matching the
/// aggregation-packet vs. fragmentation-unit vocabulary spec.md §4.8 uses
/// for H.264/H.265/VP8 alike.
pub trait Depacketizer {
    /// Depacketizes a single RTP payload into (a slice of) the underlying
    /// bitstream, reassembling across calls when fragmented.
    fn depacketize(&mut self, payload: &Bytes) -> Result<Bytes>;

    /// True when `payload` begins a new partition (is not a fragment
    /// continuation).
    fn is_partition_head(&self, payload: &Bytes) -> bool;

    /// True when `payload` (given the packet's marker bit) ends a
    /// partition.
    fn is_partition_tail(&self, marker: bool, payload: &Bytes) -> bool;

    fn packet_kind(&self, payload: &Bytes, marker: bool) -> PacketKind {
        match (
            self.is_partition_head(payload),
            self.is_partition_tail(marker, payload),
        ) {
            (true, true) => PacketKind::Standalone,
            (true, false) => PacketKind::Start,
            (false, true) => PacketKind::End,
            (false, false) => PacketKind::Middle,
        }
    }
}

/// Tagged-variant packetizer (spec.md §9).
pub enum AnyPacketizer {
    H264(h264::H264Packetizer),
    H265(h265::H265Packetizer),
    Av1(av1::Av1Packetizer),
    Vp8(vp8::Vp8Packetizer),
    Opus(opus::OpusPacketizer),
}

impl Packetizer for AnyPacketizer {
    fn generate(
        &mut self,
        track: &Arc<Track>,
        simulcast_ext: &dyn ExtensionWanter,
        twcc_ext: &dyn ExtensionWanter,
        media_protection_overhead: usize,
        pts_usec: i64,
        frame: &[u8],
    ) -> Result<Vec<Packet>> {
        match self {
            AnyPacketizer::H264(p) => p.generate(
                track,
                simulcast_ext,
                twcc_ext,
                media_protection_overhead,
                pts_usec,
                frame,
            ),
            AnyPacketizer::H265(p) => p.generate(
                track,
                simulcast_ext,
                twcc_ext,
                media_protection_overhead,
                pts_usec,
                frame,
            ),
            AnyPacketizer::Av1(p) => p.generate(
                track,
                simulcast_ext,
                twcc_ext,
                media_protection_overhead,
                pts_usec,
                frame,
            ),
            AnyPacketizer::Vp8(p) => p.generate(
                track,
                simulcast_ext,
                twcc_ext,
                media_protection_overhead,
                pts_usec,
                frame,
            ),
            AnyPacketizer::Opus(p) => p.generate(
                track,
                simulcast_ext,
                twcc_ext,
                media_protection_overhead,
                pts_usec,
                frame,
            ),
        }
    }
}

pub fn new_packetizer(codec: Codec) -> AnyPacketizer {
    match codec {
        Codec::H264 => AnyPacketizer::H264(h264::H264Packetizer::new()),
        Codec::H265 => AnyPacketizer::H265(h265::H265Packetizer::new()),
        Codec::Av1 => AnyPacketizer::Av1(av1::Av1Packetizer::new()),
        Codec::Vp8 => AnyPacketizer::Vp8(vp8::Vp8Packetizer::new()),
        Codec::Opus => AnyPacketizer::Opus(opus::OpusPacketizer::new()),
    }
}

/// Tagged-variant depacketizer (spec.md §9).
#[derive(Debug, Clone)]
pub enum AnyDepacketizer {
    H264(h264::H264Depacketizer),
    H265(h265::H265Depacketizer),
    Av1(av1::Av1Depacketizer),
    Vp8(vp8::Vp8Depacketizer),
    Opus(opus::OpusDepacketizer),
}

impl Depacketizer for AnyDepacketizer {
    fn depacketize(&mut self, payload: &Bytes) -> Result<Bytes> {
        match self {
            AnyDepacketizer::H264(d) => d.depacketize(payload),
            AnyDepacketizer::H265(d) => d.depacketize(payload),
            AnyDepacketizer::Av1(d) => d.depacketize(payload),
            AnyDepacketizer::Vp8(d) => d.depacketize(payload),
            AnyDepacketizer::Opus(d) => d.depacketize(payload),
        }
    }

    fn is_partition_head(&self, payload: &Bytes) -> bool {
        match self {
            AnyDepacketizer::H264(d) => d.is_partition_head(payload),
            AnyDepacketizer::H265(d) => d.is_partition_head(payload),
            AnyDepacketizer::Av1(d) => d.is_partition_head(payload),
            AnyDepacketizer::Vp8(d) => d.is_partition_head(payload),
            AnyDepacketizer::Opus(d) => d.is_partition_head(payload),
        }
    }

    fn is_partition_tail(&self, marker: bool, payload: &Bytes) -> bool {
        match self {
            AnyDepacketizer::H264(d) => d.is_partition_tail(marker, payload),
            AnyDepacketizer::H265(d) => d.is_partition_tail(marker, payload),
            AnyDepacketizer::Av1(d) => d.is_partition_tail(marker, payload),
            AnyDepacketizer::Vp8(d) => d.is_partition_tail(marker, payload),
            AnyDepacketizer::Opus(d) => d.is_partition_tail(marker, payload),
        }
    }
}

pub fn new_depacketizer(codec: Codec) -> Result<AnyDepacketizer> {
    Ok(match codec {
        Codec::H264 => AnyDepacketizer::H264(h264::H264Depacketizer::default()),
        Codec::H265 => AnyDepacketizer::H265(h265::H265Depacketizer::default()),
        Codec::Av1 => AnyDepacketizer::Av1(av1::Av1Depacketizer::default()),
        Codec::Vp8 => AnyDepacketizer::Vp8(vp8::Vp8Depacketizer::default()),
        Codec::Opus => AnyDepacketizer::Opus(opus::OpusDepacketizer::default()),
    })
}

/// `getPadding()` per spec.md §4.7: 0 when remaining data is under 300
/// bytes, otherwise the maximum of what simulcast/TWCC request.
pub fn get_padding(remaining: usize, simulcast_wants: usize, twcc_wants: usize) -> usize {
    if remaining < 300 {
        0
    } else {
        simulcast_wants.max(twcc_wants)
    }
}

/// `adjustPacketSize` per spec.md §4.7.
pub fn adjust_packet_size(basic: usize, padding: usize, extension_size: usize) -> usize {
    let mut size = basic;
    if padding <= basic / 2 {
        size -= padding;
    }
    if extension_size + 600 <= basic {
        size = size.saturating_sub(extension_size);
    }
    size
}

pub(crate) fn unsupported_codec() -> Error {
    Error::ErrUnsupportedCodec
}
