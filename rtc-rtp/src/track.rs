//! Track: the logical media stream shared by handle between sender,
//! receiver, packetizer, depacketizer, and RtpPacket (spec.md §3, §9).

use std::sync::{Arc, Mutex};

use crate::random::{RtpPacketSource, RtpTimeSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Publish,
    Subscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
    Vp8,
    Av1,
    Opus,
}

#[derive(Debug, Clone)]
pub struct SimulcastLayer {
    pub name: String,
    pub spatial_index: u8,
    pub target_kbps: u32,
    pub width: u16,
    pub height: u16,
    pub fps: u8,
}

/// Running statistics mutated only from the send path (spec.md §5).
#[derive(Debug, Default, Clone)]
pub struct TrackStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub packets_lost: u64,
}

#[derive(Debug)]
pub struct Track {
    pub id: String,
    pub direction: Direction,
    pub kind: MediaKind,
    pub media_id: String,
    pub codec: Codec,
    pub clock_rate: u32,
    pub payload_type: u8,
    pub ssrc: u32,
    pub rtx_payload_type: Option<u8>,
    pub rtx_ssrc: Option<u32>,
    pub remote_ssrc: Option<u32>,
    pub nack_enabled: bool,
    pub pli_enabled: bool,
    pub simulcast: Option<SimulcastLayer>,

    pub rtp_time_source: Mutex<RtpTimeSource>,
    pub rtp_packet_source: Mutex<RtpPacketSource>,
    pub rtx_packet_source: Mutex<RtpPacketSource>,
    pub stats: Mutex<TrackStats>,
}

impl Track {
    pub fn new(
        id: impl Into<String>,
        direction: Direction,
        kind: MediaKind,
        media_id: impl Into<String>,
        codec: Codec,
        clock_rate: u32,
        payload_type: u8,
        ssrc: u32,
    ) -> Arc<Track> {
        Arc::new(Track {
            id: id.into(),
            direction,
            kind,
            media_id: media_id.into(),
            codec,
            clock_rate,
            payload_type,
            ssrc,
            rtx_payload_type: None,
            rtx_ssrc: None,
            remote_ssrc: None,
            nack_enabled: false,
            pli_enabled: false,
            simulcast: None,
            rtp_time_source: Mutex::new(RtpTimeSource::new(clock_rate)),
            rtp_packet_source: Mutex::new(RtpPacketSource::new()),
            rtx_packet_source: Mutex::new(RtpPacketSource::new()),
            stats: Mutex::new(TrackStats::default()),
        })
    }

    pub fn with_rtx(mut self, rtx_payload_type: u8, rtx_ssrc: u32) -> Self {
        self.rtx_payload_type = Some(rtx_payload_type);
        self.rtx_ssrc = Some(rtx_ssrc);
        self
    }

    pub fn matches_primary(&self, ssrc: u32, payload_type: u8) -> bool {
        self.ssrc == ssrc && self.payload_type == payload_type
    }

    pub fn matches_rtx(&self, ssrc: u32, payload_type: u8) -> bool {
        self.rtx_ssrc == Some(ssrc) && self.rtx_payload_type == Some(payload_type)
    }
}
