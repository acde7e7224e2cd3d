use std::time::Duration;
use tokio::time::Instant;
use crate::schedule::{Schedule, WorkUnit};

/// Back-to-back blocks until `ttr` has elapsed since the first block. The first block is always
///  sent, termination is checked before each subsequent block.
pub struct TimeToRunSchedule {
    ttr: Duration,
    block_size: u32,
    probe: bool,
    started: Option<Instant>,
}

impl TimeToRunSchedule {
    pub fn new(ttr: Duration, block_size: u32, probe: bool) -> TimeToRunSchedule {
        TimeToRunSchedule {
            ttr,
            block_size,
            probe,
            started: None,
        }
    }
}

impl Schedule for TimeToRunSchedule {
    fn next_unit(&mut self, now: Instant) -> anyhow::Result<Option<WorkUnit>> {
        match self.started {
            None => self.started = Some(now),
            Some(started) => {
                if now.saturating_duration_since(started) >= self.ttr {
                    return Ok(None);
                }
            }
        }

        Ok(Some(WorkUnit {
            packet_count: self.block_size,
            probe: self.probe,
            delay_before: Duration::ZERO,
        }))
    }

    fn describe(&self) -> String {
        format!("blocks of {} packets for {:?}", self.block_size, self.ttr)
    }
}

pub struct BlockCountSchedule {
    num_blocks: u32,
    block_size: u32,
    probe: bool,
    num_emitted: u32,
}

impl BlockCountSchedule {
    pub fn new(num_blocks: u32, block_size: u32, probe: bool) -> BlockCountSchedule {
        BlockCountSchedule {
            num_blocks,
            block_size,
            probe,
            num_emitted: 0,
        }
    }
}

impl Schedule for BlockCountSchedule {
    fn next_unit(&mut self, _now: Instant) -> anyhow::Result<Option<WorkUnit>> {
        if self.num_emitted >= self.num_blocks {
            return Ok(None);
        }
        self.num_emitted += 1;

        Ok(Some(WorkUnit {
            packet_count: self.block_size,
            probe: self.probe,
            delay_before: Duration::ZERO,
        }))
    }

    fn describe(&self) -> String {
        format!("{} blocks of {} packets", self.num_blocks, self.block_size)
    }
}
