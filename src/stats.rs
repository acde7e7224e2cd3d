use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

/// Counters shared between the send loop and the ack listener. Every counter has exactly one
///  writer, so relaxed ordering is sufficient - readers only ever look at a snapshot.
pub struct SessionStats {
    blocks_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_failures: AtomicU64,
    acks_matched: AtomicU64,
    acks_unmatched: AtomicU64,
    evicted: AtomicU64,
    rtt: Mutex<RttTracker>,
}

impl SessionStats {
    pub fn new(rtt_moving_avg_new_weight: f64) -> SessionStats {
        SessionStats {
            blocks_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            acks_matched: AtomicU64::new(0),
            acks_unmatched: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            rtt: Mutex::new(RttTracker::new(rtt_moving_avg_new_weight)),
        }
    }

    pub fn on_block_sent(&self, num_bytes: usize) {
        self.blocks_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(num_bytes as u64, Ordering::Relaxed);
    }

    pub fn on_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_ack_matched(&self, rtt: Duration) {
        self.acks_matched.fetch_add(1, Ordering::Relaxed);
        self.rtt_tracker()
            .on_rtt(rtt);
    }

    pub fn on_ack_unmatched(&self) {
        self.acks_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_evicted(&self, num_entries: usize) {
        self.evicted.fetch_add(num_entries as u64, Ordering::Relaxed);
    }

    /// Poisoning is ignored, a panicking holder leaves at most one RTT sample half-applied
    fn rtt_tracker(&self) -> MutexGuard<'_, RttTracker> {
        self.rtt.lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let rtt = self.rtt_tracker();
        StatsSnapshot {
            blocks_sent: self.blocks_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            acks_matched: self.acks_matched.load(Ordering::Relaxed),
            acks_unmatched: self.acks_unmatched.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            rtt_min: rtt.min,
            rtt_max: rtt.max,
            rtt_moving_mean_millis: rtt.moving_mean_millis,
            rtt_moving_std_dev_millis: rtt.moving_variance_millis_squared.sqrt(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatsSnapshot {
    pub blocks_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub acks_matched: u64,
    pub acks_unmatched: u64,
    pub evicted: u64,
    pub rtt_min: Option<Duration>,
    pub rtt_max: Option<Duration>,
    pub rtt_moving_mean_millis: Option<f64>,
    pub rtt_moving_std_dev_millis: f64,
}

struct RttTracker {
    /// >0 and <= 1
    new_weight: f64,
    min: Option<Duration>,
    max: Option<Duration>,
    moving_mean_millis: Option<f64>,
    moving_variance_millis_squared: f64,
}
impl RttTracker {
    fn new(new_weight: f64) -> RttTracker {
        RttTracker {
            new_weight,
            min: None,
            max: None,
            moving_mean_millis: None,
            moving_variance_millis_squared: 0.0,
        }
    }

    fn on_rtt(&mut self, rtt: Duration) {
        self.min = Some(self.min.map_or(rtt, |m| m.min(rtt)));
        self.max = Some(self.max.map_or(rtt, |m| m.max(rtt)));

        let rtt_millis = rtt.as_secs_f64() * 1000.0;

        if let Some(prev) = self.moving_mean_millis {
            let alpha = self.new_weight;

            let mean = rtt_millis * alpha + prev * (1.0 - alpha);
            self.moving_mean_millis = Some(mean);

            let s = (mean - rtt_millis).powi(2);
            self.moving_variance_millis_squared = s * alpha + self.moving_variance_millis_squared * (1.0 - alpha);
        }
        else {
            self.moving_mean_millis = Some(rtt_millis);
            self.moving_variance_millis_squared = 0.0;
        }

        trace!("rtt={}ms, moving avg rtt={}ms, moving stddev rtt={}ms",
            rtt_millis,
            self.moving_mean_millis.unwrap_or(rtt_millis),
            self.moving_variance_millis_squared.sqrt(),
        );
    }
}
