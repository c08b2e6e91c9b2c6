//! Bounded reordering buffer with NACK scheduling and timed dequeue
//! (spec.md §4.9).
//!
//! Slots live in a fixed power-of-two ring indexed by `seq_ext & (capacity
//! - 1)`. `consume` admits packets and schedules their dequeue/NACK
//! deadlines; `process_dequeue`/`process_nack` are driven by the I/O loop
//! on the deadline `get_timeout_millis` returns (spec.md §5's "single
//! threaded cooperative" scheduling model).

use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};

use rtp::extended_value::{ExtendedValue, Width};
use rtp::packet::Packet;
use rtp::packetizer::{AnyDepacketizer, Depacketizer, PacketKind};
use rtp::track::Track;
use shared::error::{Error, Result};

/// Buffer considered idle past this gap; a large forward jump after an
/// idle period resets state instead of filling a huge lost-packet range.
const IDLE_RESET_MILLIS: u64 = 2000;

#[derive(Debug, Clone)]
struct JitterBufferItem {
    when_received: Option<Instant>,
    when_dequeue: u64,
    when_nack_request: u64,
    when_nack_abandon: u64,
    received: bool,
    nack_needed: bool,
    marker: bool,
    seq_ext: u64,
    rtp_timestamp_ext: u64,
    payload: Bytes,
    kind: PacketKind,
}

impl JitterBufferItem {
    fn lost(seq_ext: u64, when_nack_request: u64, when_nack_abandon: u64) -> Self {
        JitterBufferItem {
            when_received: None,
            when_dequeue: 0,
            when_nack_request,
            when_nack_abandon,
            received: false,
            nack_needed: true,
            marker: false,
            seq_ext,
            rtp_timestamp_ext: 0,
            payload: Bytes::new(),
            kind: PacketKind::Standalone,
        }
    }
}

pub struct JitterBufferBuilder {
    capacity: usize,
    length_millis: u64,
    nack_delay_millis: u64,
}

impl JitterBufferBuilder {
    pub fn new() -> Self {
        JitterBufferBuilder {
            capacity: 1024,
            length_millis: 80,
            nack_delay_millis: 40,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_length_millis(mut self, length_millis: u64) -> Self {
        self.length_millis = length_millis;
        self
    }

    pub fn with_nack_delay_millis(mut self, nack_delay_millis: u64) -> Self {
        self.nack_delay_millis = nack_delay_millis;
        self
    }

    pub fn build(self, track: Arc<Track>) -> Result<JitterBuffer> {
        if self.capacity == 0 || !self.capacity.is_power_of_two() {
            return Err(Error::ErrCapacityNotPowerOfTwo);
        }
        let depacketizer = rtp::packetizer::new_depacketizer(track.codec)?;
        Ok(JitterBuffer {
            track,
            capacity: self.capacity,
            length_millis: self.length_millis,
            nack_delay_millis: self.nack_delay_millis,
            slots: vec![None; self.capacity],
            min_seq: 0,
            max_seq: 0,
            initialized: false,
            created: Instant::now(),
            base_time_millis: 0,
            base_rtp_timestamp: 0,
            last_emitted_ts: None,
            last_packet_at: None,
            extended_seq: ExtendedValue::new(Width::Bits16),
            extended_ts: ExtendedValue::new(Width::Bits32),
            depacketizer,
        })
    }
}

impl Default for JitterBufferBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct JitterBuffer {
    track: Arc<Track>,
    capacity: usize,
    length_millis: u64,
    nack_delay_millis: u64,
    slots: Vec<Option<JitterBufferItem>>,
    min_seq: u64,
    max_seq: u64,
    initialized: bool,
    created: Instant,
    base_time_millis: u64,
    base_rtp_timestamp: u64,
    last_emitted_ts: Option<u64>,
    last_packet_at: Option<Instant>,
    extended_seq: ExtendedValue,
    extended_ts: ExtendedValue,
    depacketizer: AnyDepacketizer,
}

impl JitterBuffer {
    pub fn builder() -> JitterBufferBuilder {
        JitterBufferBuilder::new()
    }

    fn now_millis(&self) -> u64 {
        self.created.elapsed().as_millis() as u64
    }

    fn slot_index(&self, seq_ext: u64) -> usize {
        (seq_ext as usize) & (self.capacity - 1)
    }

    fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.initialized = false;
        self.last_emitted_ts = None;
        self.depacketizer = rtp::packetizer::new_depacketizer(self.track.codec)
            .expect("codec already validated at build time");
    }

    /// Admits one received RTP packet (spec.md §4.9 `consume`).
    pub fn consume(&mut self, packet: &Packet, raw_sequence_number: u16, raw_timestamp: u32) {
        let now = self.now_millis();
        self.last_packet_at = Some(Instant::now());

        let seq_ext = self.extended_seq.extend(raw_sequence_number as u64);
        let rtp_ts_ext = self.extended_ts.extend(raw_timestamp as u64);

        if let Some(last) = self.last_emitted_ts {
            if last > rtp_ts_ext {
                warn!(
                    "jitter buffer: dropping packet with timestamp {} behind last emitted {}",
                    rtp_ts_ext, last
                );
                return;
            }
        }

        if let Some(last_packet_at) = self.last_packet_at {
            let idle_for = Instant::now().saturating_duration_since(last_packet_at);
            if idle_for.as_millis() as u64 >= IDLE_RESET_MILLIS
                && self.initialized
                && seq_ext >= self.max_seq + (self.capacity as u64 / 8)
            {
                debug!("jitter buffer: idle reset after {} ms gap", idle_for.as_millis());
                self.reset();
            }
        }

        if !self.initialized {
            self.initialized = true;
            self.min_seq = seq_ext;
            self.max_seq = seq_ext;
            self.base_time_millis = now;
            self.base_rtp_timestamp = rtp_ts_ext;
        }

        let quarter = self.capacity as u64 / 4;
        if seq_ext + quarter <= self.min_seq || seq_ext >= self.max_seq + quarter {
            debug!("jitter buffer: dropping out-of-range seq {}", seq_ext);
            return;
        }

        let packet_time = self.base_time_millis
            + (rtp_ts_ext.saturating_sub(self.base_rtp_timestamp)) * 1000
                / self.track.clock_rate.max(1) as u64;
        let when_dequeue = packet_time + self.length_millis;
        let when_nack_request = now + self.nack_delay_millis;
        let when_nack_abandon = when_dequeue;

        let kind = self.depacketizer.packet_kind(&packet.payload, packet.marker);

        let item = JitterBufferItem {
            when_received: Some(Instant::now()),
            when_dequeue,
            when_nack_request,
            when_nack_abandon,
            received: true,
            nack_needed: false,
            marker: packet.marker,
            seq_ext,
            rtp_timestamp_ext: rtp_ts_ext,
            payload: packet.payload.clone(),
            kind,
        };

        if seq_ext < self.min_seq {
            let mut s = seq_ext + 1;
            while s < self.min_seq {
                let idx = self.slot_index(s);
                self.slots[idx] = Some(JitterBufferItem::lost(s, when_nack_request, when_dequeue));
                s += 1;
            }
            self.min_seq = seq_ext;
        }
        if seq_ext >= self.max_seq {
            let mut s = self.max_seq;
            while s < seq_ext {
                let idx = self.slot_index(s);
                self.slots[idx] = Some(JitterBufferItem::lost(s, when_nack_request, when_dequeue));
                s += 1;
            }
            self.max_seq = seq_ext + 1;
        }

        let idx = self.slot_index(seq_ext);
        self.slots[idx] = Some(item);
    }

    /// Earliest deadline across the buffer, or `default` if nothing is
    /// pending (spec.md §4.9 `getTimeoutMillis`).
    pub fn get_timeout_millis(&self, default: u64) -> u64 {
        let mut min = default;
        let mut s = self.min_seq;
        while s < self.max_seq {
            if let Some(item) = &self.slots[self.slot_index(s)] {
                if item.received {
                    min = min.min(item.when_dequeue);
                } else {
                    min = min.min(item.when_nack_request).min(item.when_nack_abandon);
                }
            }
            s += 1;
        }
        min
    }

    /// Extracts ready frames in seq order (spec.md §4.9 `processDeque`).
    pub fn process_dequeue(&mut self) -> Vec<Bytes> {
        let now = self.now_millis();
        let mut frames = Vec::new();

        loop {
            if self.min_seq >= self.max_seq {
                break;
            }
            let idx = self.slot_index(self.min_seq);
            let Some(item) = self.slots[idx].clone() else {
                break;
            };

            if item.received && now >= item.when_dequeue {
                match item.kind {
                    PacketKind::Standalone => {
                        if let Some(frame) = self.extract_and_advance(self.min_seq) {
                            frames.push(frame);
                        }
                    }
                    PacketKind::Start => {
                        if let Some(end_seq) = self.find_chain_end(self.min_seq) {
                            if let Some(frame) = self.extract_chain(self.min_seq, end_seq) {
                                frames.push(frame);
                            }
                        } else if self.later_ready_exists(self.min_seq, now) {
                            debug!("jitter buffer: dropping incomplete partition starting at {}", self.min_seq);
                            self.min_seq += 1;
                        } else {
                            break;
                        }
                    }
                    PacketKind::Middle | PacketKind::End => {
                        trace!("jitter buffer: dropping {:?} without preceding start", item.kind);
                        self.min_seq += 1;
                    }
                }
                continue;
            }

            if !item.received && now >= item.when_nack_abandon {
                trace!("jitter buffer: abandoning lost slot {}", self.min_seq);
                self.min_seq += 1;
                continue;
            }

            break;
        }

        frames
    }

    fn later_ready_exists(&self, from: u64, now: u64) -> bool {
        let mut s = from + 1;
        while s < self.max_seq {
            if let Some(item) = &self.slots[self.slot_index(s)] {
                if item.received && now >= item.when_dequeue {
                    return true;
                }
            }
            s += 1;
        }
        false
    }

    fn find_chain_end(&self, start: u64) -> Option<u64> {
        let mut s = start;
        while s < self.max_seq {
            let item = self.slots[self.slot_index(s)].as_ref()?;
            if !item.received {
                return None;
            }
            if item.kind == PacketKind::End {
                return Some(s);
            }
            s += 1;
        }
        None
    }

    fn extract_and_advance(&mut self, seq: u64) -> Option<Bytes> {
        let idx = self.slot_index(seq);
        let item = self.slots[idx].take()?;
        self.min_seq = seq + 1;
        self.emit(item.rtp_timestamp_ext, &item.payload)
    }

    fn extract_chain(&mut self, start: u64, end: u64) -> Option<Bytes> {
        let mut buf = BytesMut::new();
        let mut ts = None;
        let mut s = start;
        while s <= end {
            let idx = self.slot_index(s);
            if let Some(item) = self.slots[idx].take() {
                ts.get_or_insert(item.rtp_timestamp_ext);
                if let Ok(part) = self.depacketizer.depacketize(&item.payload) {
                    buf.extend_from_slice(&part);
                }
            }
            s += 1;
        }
        self.min_seq = end + 1;
        self.emit(ts.unwrap_or(0), &buf.freeze())
    }

    fn emit(&mut self, rtp_timestamp_ext: u64, payload: &Bytes) -> Option<Bytes> {
        if let Some(last) = self.last_emitted_ts {
            if rtp_timestamp_ext <= last {
                warn!("jitter buffer: refusing non-increasing frame timestamp {}", rtp_timestamp_ext);
                return None;
            }
        }
        self.last_emitted_ts = Some(rtp_timestamp_ext);
        Some(payload.clone())
    }

    /// Returns native 16-bit sequence numbers due for NACK (spec.md §4.9
    /// `processNack`).
    pub fn process_nack(&mut self) -> Vec<u16> {
        let now = self.now_millis();
        let mut out = Vec::new();
        let mut s = self.min_seq;
        while s < self.max_seq {
            let idx = self.slot_index(s);
            match &mut self.slots[idx] {
                Some(item) if item.when_nack_request <= now => {
                    if !item.received && item.nack_needed {
                        item.nack_needed = false;
                        out.push(item.seq_ext as u16);
                    }
                }
                _ => break,
            }
            s += 1;
        }
        out
    }
}

/// Groups ascending 16-bit sequence numbers into RFC 4585 generic NACK
/// `(PID, BLP)` pairs (spec.md §4.9).
pub fn compress_nack_list(seqs: &[u16]) -> Vec<(u16, u16)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < seqs.len() {
        let base = seqs[i];
        let mut blp: u16 = 0;
        let mut j = i + 1;
        while j < seqs.len() {
            let delta = seqs[j].wrapping_sub(base);
            if delta > 16 {
                break;
            }
            blp |= 1 << (delta - 1);
            j += 1;
        }
        out.push((base, blp));
        i = j;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_nack_list_matches_spec_vector() {
        let compressed = compress_nack_list(&[100, 101, 102, 103, 120]);
        assert_eq!(compressed, vec![(100, 0x0007), (120, 0x0000)]);
    }

    #[test]
    fn test_compress_nack_list_empty() {
        assert_eq!(compress_nack_list(&[]), vec![]);
    }

    #[test]
    fn test_compress_nack_list_single() {
        assert_eq!(compress_nack_list(&[5]), vec![(5, 0)]);
    }
}
