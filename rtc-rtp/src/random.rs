//! Randomised starting state and clock-to-RTP-timestamp conversion for a
//! Track's packet sources (spec.md §4.4).

use rand::Rng;

/// Thin wrapper over the process RNG, one per Track, so starting values do
/// not correlate across tracks sharing a process.
#[derive(Debug, Default)]
pub struct RandomGenerator;

impl RandomGenerator {
    pub fn new() -> Self {
        RandomGenerator
    }

    pub fn random_u16(&self) -> u16 {
        rand::rng().random()
    }

    pub fn random_u32(&self) -> u32 {
        rand::rng().random()
    }

    /// A 31-bit random value, used to seed the initial RTP timestamp.
    pub fn random_u31(&self) -> u32 {
        self.random_u32() & 0x7FFF_FFFF
    }
}

/// Randomised 16-bit sequence source with rollover tracking for a single
/// RTP channel (primary or RTX).
#[derive(Debug)]
pub struct RtpPacketSource {
    seq: u16,
    rollover: u32,
}

impl RtpPacketSource {
    pub fn new() -> Self {
        RtpPacketSource {
            seq: RandomGenerator::new().random_u16(),
            rollover: 0,
        }
    }

    /// Returns `(rollover, seq)` for the next packet, advancing state.
    pub fn next_sequence(&mut self) -> (u32, u16) {
        let (rollover, seq) = (self.rollover, self.seq);
        let (next_seq, wrapped) = self.seq.overflowing_add(1);
        self.seq = next_seq;
        if wrapped {
            self.rollover = self.rollover.wrapping_add(1);
        }
        (rollover, seq)
    }

    pub fn current_sequence(&self) -> (u32, u16) {
        (self.rollover, self.seq)
    }
}

impl Default for RtpPacketSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a monotonic presentation timestamp (microseconds) into RTP
/// timestamp units for a track of a given clock rate (spec.md §4.4).
#[derive(Debug)]
pub struct RtpTimeSource {
    clock_rate: u32,
    rtp_ts: u32,
    last_pts_usec: Option<i64>,
    last_wall: std::time::Instant,
}

impl RtpTimeSource {
    pub fn new(clock_rate: u32) -> Self {
        RtpTimeSource {
            clock_rate,
            rtp_ts: RandomGenerator::new().random_u31(),
            last_pts_usec: None,
            last_wall: std::time::Instant::now(),
        }
    }

    /// Converts `pts_usec` to an RTP timestamp, accumulating from the last
    /// call. A backward `pts_usec` leaves the RTP timestamp unchanged
    /// (monotone per spec.md §4.4).
    pub fn get_frame_timestamp(&mut self, pts_usec: i64) -> u32 {
        match self.last_pts_usec {
            None => {
                self.last_pts_usec = Some(pts_usec);
                self.last_wall = std::time::Instant::now();
                self.rtp_ts
            }
            Some(last_pts) => {
                if pts_usec <= last_pts {
                    return self.rtp_ts;
                }
                let delta_usec = (pts_usec - last_pts) as u64;
                let delta_rtp = delta_usec * self.clock_rate as u64 / 1_000_000;
                self.rtp_ts = self.rtp_ts.wrapping_add(delta_rtp as u32);
                self.last_pts_usec = Some(pts_usec);
                self.last_wall = std::time::Instant::now();
                self.rtp_ts
            }
        }
    }

    /// Extrapolates the current RTP timestamp from wall-clock elapsed time
    /// since the last frame, without advancing stored state.
    pub fn get_current_timestamp(&self) -> u32 {
        let elapsed = self.last_wall.elapsed();
        let delta_rtp = elapsed.as_secs_f64() * self.clock_rate as f64;
        self.rtp_ts.wrapping_add(delta_rtp as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_source_wraps_rollover() {
        let mut src = RtpPacketSource::new();
        src.seq = u16::MAX;
        src.rollover = 0;
        let (rollover, seq) = src.next_sequence();
        assert_eq!((rollover, seq), (0, u16::MAX));
        assert_eq!(src.current_sequence(), (1, 0));
    }

    #[test]
    fn test_time_source_monotone_on_backward_pts() {
        let mut ts = RtpTimeSource::new(90_000);
        let first = ts.get_frame_timestamp(1_000_000);
        let second = ts.get_frame_timestamp(500_000);
        assert_eq!(first, second);
    }

    #[test]
    fn test_time_source_accumulates() {
        let mut ts = RtpTimeSource::new(90_000);
        let first = ts.get_frame_timestamp(0);
        let second = ts.get_frame_timestamp(1_000_000);
        assert_eq!(second.wrapping_sub(first), 90_000);
    }
}
