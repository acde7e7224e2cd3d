use std::path::PathBuf;
use std::time::Duration;
use anyhow::bail;
use crate::codec::packet::{Packet, DEFAULT_DATAGRAM_PACKET_SIZE, DEFAULT_STREAM_PACKET_SIZE};

/// The rate policy that drives a session
#[derive(Clone, Debug, PartialEq)]
pub enum SendMode {
    /// keep sending blocks of `block_size` packets back-to-back until the duration has elapsed
    TimeToRun(Duration),
    /// send exactly this many blocks of `block_size` packets
    BlockCount(u32),
    /// replay the inter-arrival gaps recorded in a trace file, coalescing runs of identical
    ///  offsets into bursts
    Trace(PathBuf),
    /// send single packets, paced to a maximum bandwidth (or back-to-back if there is none or it
    ///  is zero), until the duration has elapsed
    ConstantBitrate {
        ttr: Duration,
        max_bandwidth_mbps: Option<u32>,
    },
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub mode: SendMode,

    /// Number of packets per block in block-sending modes. All packets of a block share a
    ///  sequence number and are sent in a single transport write. Ignored in trace and
    ///  constant-bitrate mode.
    pub block_size: u32,

    /// The fixed size of each packet on the wire, including the header
    pub packet_size: usize,

    /// whether packets of block-sending modes are flagged as 'probe' packets
    pub probe: bool,

    /// Upper bound for waiting on outstanding acks after the schedule is done. If this is `None`,
    ///  it is derived from the session's duration, see [SessionConfig::effective_drain_timeout].
    pub drain_timeout: Option<Duration>,

    /// Additional time given to the ack listener to terminate after the drain timeout before it
    ///  is cancelled forcibly
    pub join_grace_period: Duration,

    /// If this is set, pending entries older than this are evicted periodically. If it is not
    ///  set, entries for lost packets stay in the pending table for the rest of the session.
    pub pending_max_age: Option<Duration>,
    pub eviction_interval: Duration,

    /// >0 and <= 1
    pub rtt_moving_avg_new_weight: f64,
}

impl SessionConfig {
    pub const DEFAULT_TTR: Duration = Duration::from_secs(10);
    pub const DEFAULT_BLOCK_SIZE: u32 = 128;
    const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

    /// block-sending modes over a TCP stream
    pub fn new_stream(mode: SendMode) -> SessionConfig {
        SessionConfig {
            mode,
            block_size: Self::DEFAULT_BLOCK_SIZE,
            packet_size: DEFAULT_STREAM_PACKET_SIZE,
            probe: false,
            drain_timeout: None,
            join_grace_period: Duration::from_secs(1),
            pending_max_age: None,
            eviction_interval: Duration::from_secs(1),
            rtt_moving_avg_new_weight: 0.5,
        }
    }

    /// paced single-packet sending over UDP
    pub fn new_datagram(ttr: Duration, max_bandwidth_mbps: Option<u32>) -> SessionConfig {
        SessionConfig {
            mode: SendMode::ConstantBitrate { ttr, max_bandwidth_mbps },
            block_size: 1,
            packet_size: DEFAULT_DATAGRAM_PACKET_SIZE,
            ..Self::new_stream(SendMode::TimeToRun(ttr))
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.block_size < 1 {
            bail!("block size must be at least 1");
        }
        if self.packet_size < Packet::HEADER_LEN {
            bail!("packet size {} is smaller than the packet header ({} bytes)", self.packet_size, Packet::HEADER_LEN);
        }
        if self.block_size as usize * self.packet_size > u32::MAX as usize {
            bail!("block of {} packets of {} bytes is too big", self.block_size, self.packet_size);
        }
        if !(self.rtt_moving_avg_new_weight > 0.0 && self.rtt_moving_avg_new_weight <= 1.0) {
            bail!("RTT moving average weight must be in (0, 1]");
        }
        if self.pending_max_age.is_some() && self.eviction_interval.is_zero() {
            bail!("eviction interval must not be zero");
        }
        Ok(())
    }

    /// The configured drain timeout or, by default, twice the session's configured duration
    pub fn effective_drain_timeout(&self) -> Duration {
        if let Some(timeout) = self.drain_timeout {
            return timeout;
        }

        match &self.mode {
            SendMode::TimeToRun(ttr) | SendMode::ConstantBitrate { ttr, .. } => 2 * *ttr,
            SendMode::BlockCount(_) | SendMode::Trace(_) => Self::DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// configuration for the receiving side
#[derive(Clone, Debug)]
pub struct ResponderConfig {
    pub packet_size: usize,
    /// whether acks carry the inter-arrival time at the receiver
    pub report_inter_arrival: bool,
}

impl ResponderConfig {
    pub fn default_datagram() -> ResponderConfig {
        ResponderConfig {
            packet_size: DEFAULT_DATAGRAM_PACKET_SIZE,
            report_inter_arrival: false,
        }
    }

    pub fn default_stream() -> ResponderConfig {
        ResponderConfig {
            packet_size: DEFAULT_STREAM_PACKET_SIZE,
            report_inter_arrival: false,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.packet_size < Packet::HEADER_LEN {
            bail!("packet size {} is smaller than the packet header ({} bytes)", self.packet_size, Packet::HEADER_LEN);
        }
        Ok(())
    }
}
