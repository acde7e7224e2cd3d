use std::time::Duration;
use tokio::time::Instant;
use crate::schedule::{Schedule, WorkUnit};

/// Single packets, each with its own sequence number, spaced evenly to stay below a maximum
///  bandwidth. Without a bandwidth limit, packets go out back-to-back.
pub struct ConstantBitrateSchedule {
    ttr: Duration,
    interval: Option<Duration>,
    started: Option<Instant>,
}

impl ConstantBitrateSchedule {
    pub fn new(ttr: Duration, max_bandwidth_mbps: Option<u32>, packet_size: usize) -> ConstantBitrateSchedule {
        ConstantBitrateSchedule {
            ttr,
            interval: max_bandwidth_mbps.and_then(|mbps| Self::send_interval(mbps, packet_size)),
            started: None,
        }
    }

    /// `None` if there is no meaningful pacing, i.e. for a bandwidth of zero
    pub fn packets_per_second(max_bandwidth_mbps: u32, packet_size: usize) -> Option<f64> {
        if max_bandwidth_mbps == 0 || packet_size == 0 {
            return None;
        }
        Some((max_bandwidth_mbps as f64 * 1e6 / 8.0) / packet_size as f64)
    }

    pub fn send_interval(max_bandwidth_mbps: u32, packet_size: usize) -> Option<Duration> {
        let pps = Self::packets_per_second(max_bandwidth_mbps, packet_size)?;
        Some(Duration::from_secs_f64(1.0 / pps))
    }
}

impl Schedule for ConstantBitrateSchedule {
    fn next_unit(&mut self, now: Instant) -> anyhow::Result<Option<WorkUnit>> {
        let delay_before = match self.started {
            None => {
                self.started = Some(now);
                Duration::ZERO
            }
            Some(started) => {
                if now.saturating_duration_since(started) >= self.ttr {
                    return Ok(None);
                }
                self.interval.unwrap_or(Duration::ZERO)
            }
        };

        Ok(Some(WorkUnit {
            packet_count: 1,
            probe: false,
            delay_before,
        }))
    }

    fn describe(&self) -> String {
        match self.interval {
            Some(interval) => format!("single packets every {:?} for {:?}", interval, self.ttr),
            None => format!("unpaced single packets for {:?}", self.ttr),
        }
    }
}
