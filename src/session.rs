use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};
use crate::ack_listener::AckListener;
use crate::config::SessionConfig;
use crate::log_records::{RoundTripLog, SentLog, SharedRoundTripLog};
use crate::pending_table::PendingSendTable;
use crate::schedule::pacer::Pacer;
use crate::schedule::{schedule_for, Schedule};
use crate::shutdown::ShutdownSignal;
use crate::stats::{SessionStats, StatsSnapshot};
use crate::timestamp::Timestamp;
use crate::transmitter::Transmitter;
use crate::transport::{AckSource, PacketSink};
use crate::util::format_bytes;

/// Idle -> Running -> Draining -> Terminated, there are no other transitions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Draining,
    Terminated,
}

#[derive(Clone, Debug)]
pub struct SessionReport {
    /// `true` if the schedule was aborted (e.g. because of a malformed trace file), or if at least
    ///  one block failed to send or was sent only partially
    pub failed: bool,
    pub stats: StatsSnapshot,
    /// number of sends that were never acknowledged (or evicted) when the session ended
    pub pending_remaining: usize,
    /// `true` if the ack listener had to be cancelled because it did not terminate in time
    pub listener_cancelled: bool,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

struct AckTracking {
    source: Arc<dyn AckSource>,
    log: SharedRoundTripLog,
}

/// Runs a single measurement: the send loop on the calling task and, if acks are tracked, an
///  ack listener on a task of its own.
pub struct Session {
    config: SessionConfig,
    sink: Arc<dyn PacketSink>,
    sent_log: SentLog,
    ack_tracking: Option<AckTracking>,
    shutdown: Arc<ShutdownSignal>,
    state: watch::Sender<SessionState>,
}

impl Session {
    pub fn new(config: SessionConfig, sink: Arc<dyn PacketSink>, sent_log: SentLog) -> anyhow::Result<Session> {
        config.validate()?;

        let (state, _) = watch::channel(SessionState::Idle);
        Ok(Session {
            config,
            sink,
            sent_log,
            ack_tracking: None,
            shutdown: Arc::new(ShutdownSignal::new()),
            state,
        })
    }

    /// Match acks received from `source` against sent blocks. Without this, nothing is recorded
    ///  in a pending table.
    pub fn with_acks(mut self, source: Arc<dyn AckSource>, round_trip_log: RoundTripLog) -> Session {
        self.ack_tracking = Some(AckTracking { source, log: SharedRoundTripLog::new(round_trip_log) });
        self
    }

    /// Triggering the signal stops the schedule after the current unit, with outstanding acks
    ///  being drained as for a regular end of the schedule
    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        self.shutdown.clone()
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Runs the schedule derived from the configuration. Failure to set the schedule up is an
    ///  error, failures after that are reported in the [SessionReport].
    pub async fn run(self) -> anyhow::Result<SessionReport> {
        let schedule = schedule_for(&self.config)?;
        Ok(self.run_schedule(schedule).await)
    }

    pub async fn run_schedule(self, mut schedule: Box<dyn Schedule>) -> SessionReport {
        let Session { config, sink, sent_log, ack_tracking, shutdown, state } = self;

        let stats = Arc::new(SessionStats::new(config.rtt_moving_avg_new_weight));
        let table = Arc::new(PendingSendTable::new());
        let drain_timeout = config.effective_drain_timeout();
        // separate from `shutdown`, so that draining starts only after the last send
        let drain = Arc::new(ShutdownSignal::new());

        let start_time = Timestamp::now();
        info!("START SEND TIME {}", start_time);

        let round_trip_log = ack_tracking.as_ref().map(|tracking| tracking.log.clone());
        let listener = ack_tracking.map(|tracking| {
            let mut listener = AckListener::new(tracking.source, table.clone(), stats.clone(), drain.clone(), tracking.log, drain_timeout);
            if let Some(max_age) = config.pending_max_age {
                listener = listener.with_eviction(max_age, config.eviction_interval);
            }
            tokio::spawn(listener.run())
        });

        let tracked_table = listener.as_ref().map(|_| table.clone());
        let mut transmitter = Transmitter::new(sink, tracked_table, stats.clone(), sent_log, config.packet_size);

        transition(&state, SessionState::Running);
        let schedule_failed = send_loop(schedule.as_mut(), &mut transmitter, &shutdown).await;

        transition(&state, SessionState::Draining);
        drain.trigger();

        let listener_cancelled = match listener {
            Some(handle) => join_listener(handle, drain_timeout + config.join_grace_period).await,
            None => false,
        };

        transition(&state, SessionState::Terminated);
        transmitter.into_sent_log().flush();
        if let Some(round_trip_log) = round_trip_log {
            round_trip_log.lock().flush();
        }

        let stats = stats.snapshot();
        if stats.send_failures > 0 {
            warn!("{} blocks failed to send", stats.send_failures);
        }
        let failed = schedule_failed || stats.send_failures > 0;
        let end_time = Timestamp::now();
        info!("END SEND TIME {} BYTES {}", end_time, stats.bytes_sent);
        info!("sent {} in {} blocks, {} acks matched", format_bytes(stats.bytes_sent), stats.blocks_sent, stats.acks_matched);

        SessionReport {
            failed,
            stats,
            pending_remaining: table.len().await,
            listener_cancelled,
            start_time,
            end_time,
        }
    }
}

/// Waits for the ack listener to finish draining, cancelling it if it takes longer than
///  `join_timeout`. Returns `true` if it was cancelled.
async fn join_listener(mut handle: JoinHandle<()>, join_timeout: Duration) -> bool {
    match time::timeout(join_timeout, &mut handle).await {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            error!("ack listener terminated abnormally: {}", e);
            false
        }
        Err(_) => {
            warn!("ack listener did not terminate within {:?} - cancelling it", join_timeout);
            handle.abort();
            let _ = handle.await;
            true
        }
    }
}

/// returns `true` if the schedule failed
async fn send_loop(schedule: &mut dyn Schedule, transmitter: &mut Transmitter, shutdown: &ShutdownSignal) -> bool {
    let mut pacer = Pacer::new();

    loop {
        if shutdown.is_triggered() {
            info!("shutdown requested - stopping after {} blocks", transmitter.last_seq());
            return false;
        }

        let unit = match schedule.next_unit(Instant::now()) {
            Ok(Some(unit)) => unit,
            Ok(None) => {
                debug!("schedule complete");
                return false;
            }
            Err(e) => {
                error!("aborting schedule: {:#}", e);
                return true;
            }
        };

        let deadline = pacer.next_deadline(unit.delay_before, Instant::now());
        if deadline > Instant::now() {
            select! {
                biased;
                _ = shutdown.wait() => continue,
                _ = time::sleep_until(deadline) => {}
            }
        }

        if let Err(e) = transmitter.send_block(unit.packet_count, unit.probe).await {
            error!("aborting schedule: {}", e);
            return true;
        }
    }
}

fn transition(state: &watch::Sender<SessionState>, new_state: SessionState) {
    let old_state = state.send_replace(new_state);
    debug!("session state {:?} -> {:?}", old_state, new_state);
}
