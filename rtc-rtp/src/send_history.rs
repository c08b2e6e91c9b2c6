//! Per-SSRC bounded cache of recently sent packets, used to serve NACK
//! retransmission requests (spec.md §4.10).

use std::collections::{HashMap, VecDeque};

use crate::packet::Packet;

const DEFAULT_CAPACITY: usize = 512;

#[derive(Debug, Default)]
struct PerSsrcHistory {
    entries: VecDeque<Packet>,
}

/// Owned exclusively by the send path (spec.md §5).
#[derive(Debug)]
pub struct SendRtpHistory {
    capacity: usize,
    by_ssrc: HashMap<u32, PerSsrcHistory>,
}

impl SendRtpHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SendRtpHistory {
            capacity,
            by_ssrc: HashMap::new(),
        }
    }

    /// Pushes `packet` to the front of its SSRC's history, evicting the
    /// oldest entry once `capacity` is reached.
    pub fn save(&mut self, packet: Packet) {
        let ssrc = packet.track.ssrc;
        let history = self.by_ssrc.entry(ssrc).or_default();
        history.entries.push_front(packet);
        while history.entries.len() > self.capacity {
            history.entries.pop_back();
        }
    }

    /// Returns the cached packet for `(ssrc, seq)`, if still retained.
    pub fn find(&self, ssrc: u32, seq: u16) -> Option<&Packet> {
        self.by_ssrc
            .get(&ssrc)?
            .entries
            .iter()
            .find(|p| p.sequence_number == seq)
    }
}

impl Default for SendRtpHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{Codec, Direction, MediaKind, Track};
    use bytes::Bytes;

    fn packet(track: &std::sync::Arc<Track>, seq: u16) -> Packet {
        Packet {
            track: std::sync::Arc::clone(track),
            marker: false,
            rollover: 0,
            sequence_number: seq,
            timestamp: seq as u32,
            padding: 0,
            extension: None,
            payload: Bytes::from_static(b"x"),
        }
    }

    #[test]
    fn test_find_returns_saved_packet() {
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
        let mut history = SendRtpHistory::new();
        history.save(packet(&track, 5));
        assert!(history.find(1, 5).is_some());
        assert!(history.find(1, 6).is_none());
    }

    #[test]
    fn test_evicts_oldest_beyond_capacity() {
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
        let mut history = SendRtpHistory::with_capacity(2);
        history.save(packet(&track, 1));
        history.save(packet(&track, 2));
        history.save(packet(&track, 3));
        assert!(history.find(1, 1).is_none());
        assert!(history.find(1, 2).is_some());
        assert!(history.find(1, 3).is_some());
    }
}
