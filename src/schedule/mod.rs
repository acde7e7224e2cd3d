use std::fs::File;
use std::io::BufReader;
use std::time::Duration;
use anyhow::Context;
use tokio::time::Instant;
use tracing::info;
use crate::config::{SendMode, SessionConfig};
use crate::schedule::block::{BlockCountSchedule, TimeToRunSchedule};
use crate::schedule::constant_bitrate::ConstantBitrateSchedule;
use crate::schedule::trace::TraceSchedule;

pub mod block;
pub mod trace;
pub mod constant_bitrate;
pub mod pacer;

/// One atomic transport write of `packet_count` packets sharing a sequence number, preceded by
///  a pause of `delay_before` relative to the previous unit's scheduled start
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkUnit {
    pub packet_count: u32,
    pub probe: bool,
    pub delay_before: Duration,
}

/// A rate policy, producing units of work on demand until it is exhausted
pub trait Schedule: Send {
    /// Returns `Ok(None)` once the schedule is complete. An error aborts the schedule, units that
    ///  were returned before remain valid.
    ///
    /// `now` is the time at which the caller is ready to execute the next unit.
    fn next_unit(&mut self, now: Instant) -> anyhow::Result<Option<WorkUnit>>;

    /// for logging
    fn describe(&self) -> String;
}

pub fn schedule_for(config: &SessionConfig) -> anyhow::Result<Box<dyn Schedule>> {
    let schedule: Box<dyn Schedule> = match &config.mode {
        SendMode::TimeToRun(ttr) => Box::new(TimeToRunSchedule::new(*ttr, config.block_size, config.probe)),
        SendMode::BlockCount(n) => Box::new(BlockCountSchedule::new(*n, config.block_size, config.probe)),
        SendMode::Trace(path) => {
            let file = File::open(path)
                .with_context(|| format!("unable to open trace file {:?}", path))?;
            Box::new(TraceSchedule::new(BufReader::new(file), path.display().to_string()))
        }
        SendMode::ConstantBitrate { ttr, max_bandwidth_mbps } => Box::new(
            ConstantBitrateSchedule::new(*ttr, *max_bandwidth_mbps, config.packet_size)
        ),
    };
    info!("schedule: {}", schedule.describe());
    Ok(schedule)
}
