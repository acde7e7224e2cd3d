use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use crate::codec::ack::Ack;
use crate::log_records::SharedRoundTripLog;
use crate::pending_table::PendingSendTable;
use crate::shutdown::ShutdownSignal;
use crate::stats::SessionStats;
use crate::timestamp::Timestamp;
use crate::transport::AckSource;

#[derive(Clone, Debug, PartialEq)]
pub enum AckOutcome {
    Matched { seq: u32, rtt: Duration },
    /// a duplicate, or an ack for a packet that was never recorded or was evicted
    Unmatched { seq: u32 },
    Malformed,
}

/// Receives acks concurrently to the send loop, matching them against the pending table and
///  writing round-trip records.
///
/// The listener keeps running after the drain signal is triggered, 'draining' outstanding acks
///  until either the pending table is empty or the drain timeout has elapsed. The signal must only
///  be triggered once no further sends can happen, otherwise a send completing after the table was
///  found empty would never be matched.
///
/// Flushing the round-trip log is left to the owner of the [SharedRoundTripLog].
pub struct AckListener {
    source: Arc<dyn AckSource>,
    table: Arc<PendingSendTable>,
    stats: Arc<SessionStats>,
    drain: Arc<ShutdownSignal>,
    log: SharedRoundTripLog,
    drain_timeout: Duration,
    eviction: Option<(Duration, Duration)>,
}

impl AckListener {
    pub fn new(source: Arc<dyn AckSource>, table: Arc<PendingSendTable>, stats: Arc<SessionStats>, drain: Arc<ShutdownSignal>, log: SharedRoundTripLog, drain_timeout: Duration) -> AckListener {
        AckListener {
            source,
            table,
            stats,
            drain,
            log,
            drain_timeout,
            eviction: None,
        }
    }

    /// periodically evict pending entries older than `max_age`
    pub fn with_eviction(mut self, max_age: Duration, interval: Duration) -> AckListener {
        self.eviction = Some((max_age, interval));
        self
    }

    /// Runs until the drain signal is triggered and draining is complete
    pub async fn run(mut self) {
        // room for one extra byte so that oversized acks are detected as such
        let mut buf = [0u8; Ack::SERIALIZED_LEN_WITH_IAT + 1];
        let mut drain_deadline: Option<Instant> = None;
        let mut eviction_ticks = self.eviction.map(|(_, interval)| {
            let mut ticks = time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks
        });

        loop {
            if drain_deadline.is_some() && self.table.is_empty().await {
                debug!("all outstanding acks were received");
                break;
            }

            select! {
                biased;
                _ = self.drain.wait(), if drain_deadline.is_none() => {
                    debug!("draining - waiting up to {:?} for {} outstanding acks", self.drain_timeout, self.table.len().await);
                    drain_deadline = Some(Instant::now() + self.drain_timeout);
                }
                _ = time::sleep_until(drain_deadline.unwrap_or_else(Instant::now)), if drain_deadline.is_some() => {
                    info!("drain timeout elapsed with {} acks outstanding", self.table.len().await);
                    break;
                }
                _ = next_tick(&mut eviction_ticks) => {
                    self.evict().await;
                }
                received = self.source.recv_ack(&mut buf) => match received {
                    Ok(n) => {
                        let recv_at = Instant::now();
                        let completion_time = Timestamp::now();
                        self.on_ack(&buf[..n], completion_time, recv_at).await;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => {
                        debug!("receiving acks was interrupted - retrying");
                    }
                    Err(e) => {
                        warn!("error receiving ack: {}", e);
                    }
                },
            }
        }
    }

    /// Handles a single raw ack that was received at `recv_at`
    pub async fn on_ack(&mut self, mut raw: &[u8], completion_time: Timestamp, recv_at: Instant) -> AckOutcome {
        let ack = match Ack::deser(&mut raw) {
            Ok(ack) => ack,
            Err(e) => {
                warn!("received unparseable ack - skipping: {}", e);
                return AckOutcome::Malformed;
            }
        };

        match self.table.lookup_and_remove(ack.seq).await {
            Some(entry) => {
                let rtt = recv_at.saturating_duration_since(entry.sent_at);
                trace!("ack for #{}: rtt={:?}", ack.seq, rtt);

                self.log.lock().record(ack.seq, ack.bytes_acked, entry.send_time, ack.recv_time, completion_time);
                self.stats.on_ack_matched(rtt);
                AckOutcome::Matched { seq: ack.seq, rtt }
            }
            None => {
                debug!("ack for #{} does not match a pending send - ignoring", ack.seq);
                self.stats.on_ack_unmatched();
                AckOutcome::Unmatched { seq: ack.seq }
            }
        }
    }

    async fn evict(&mut self) {
        if let Some((max_age, _)) = self.eviction {
            let num_evicted = self.table.evict_older_than(max_age, Instant::now()).await;
            self.stats.on_evicted(num_evicted);
        }
    }
}

async fn next_tick(ticks: &mut Option<Interval>) {
    match ticks {
        Some(ticks) => { ticks.tick().await; }
        None => std::future::pending().await,
    }
}
