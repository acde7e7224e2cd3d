use std::io::{BufRead, Lines};
use std::time::Duration;
use anyhow::bail;
use tokio::time::Instant;
use tracing::{debug, trace};
use crate::schedule::{Schedule, WorkUnit};

/// A burst of consecutive trace lines sharing the same offset and probe flag
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceBlock {
    /// the offset of this block minus the offset of the previous block, clamped to zero - for the
    ///  first block, this is its offset relative to the start of the trace
    pub gap_micros: u64,
    pub probe: bool,
    pub packet_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TraceLine {
    offset_micros: i64,
    probe: bool,
}

/// Parses a trace line of the form `<offset in micros>` with an optional `*` marking a probe
///  packet. Returns `Ok(None)` for blank lines.
fn parse_line(line: &str) -> anyhow::Result<Option<TraceLine>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let probe = line.contains('*');
    let numeric = line.split('*').next().unwrap_or("").trim();
    let offset_micros = match numeric.parse::<i64>() {
        Ok(o) => o,
        Err(e) => bail!("{}", e),
    };

    Ok(Some(TraceLine { offset_micros, probe }))
}

/// Reads a trace lazily, so that a malformed line is only detected when replay reaches it. Blocks
///  that were produced before remain valid.
pub struct TraceSchedule<R: BufRead> {
    name: String,
    lines: Lines<R>,
    line_number: usize,
    /// first line of the block currently being collected, and the number of lines in it so far
    current: Option<(TraceLine, u32)>,
    prev_block_offset: i64,
    exhausted: bool,
}

impl <R: BufRead> TraceSchedule<R> {
    pub fn new(reader: R, name: String) -> TraceSchedule<R> {
        TraceSchedule {
            name,
            lines: reader.lines(),
            line_number: 0,
            current: None,
            prev_block_offset: 0,
            exhausted: false,
        }
    }

    fn finish_block(&mut self, first: TraceLine, packet_count: u32) -> TraceBlock {
        let gap_micros = first.offset_micros
            .saturating_sub(self.prev_block_offset)
            .max(0) as u64;
        self.prev_block_offset = first.offset_micros;

        trace!("trace block: {} packets at offset {}us (gap {}us), probe={}", packet_count, first.offset_micros, gap_micros, first.probe);
        TraceBlock {
            gap_micros,
            probe: first.probe,
            packet_count,
        }
    }

    pub fn next_block(&mut self) -> anyhow::Result<Option<TraceBlock>> {
        if self.exhausted {
            return Ok(None);
        }

        loop {
            let raw = match self.lines.next() {
                Some(line) => line?,
                None => {
                    self.exhausted = true;
                    debug!("trace {}: end of trace after {} lines", self.name, self.line_number);
                    // the last block is not terminated by a change, so it is flushed here
                    return Ok(self.current.take()
                        .map(|(first, count)| self.finish_block(first, count)));
                }
            };
            self.line_number += 1;

            let parsed = match parse_line(&raw) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => continue,
                Err(e) => {
                    self.exhausted = true;
                    bail!("malformed line {} in trace {}: {:?} ({})", self.line_number, self.name, raw, e);
                }
            };

            match self.current.take() {
                None => {
                    self.current = Some((parsed, 1));
                }
                Some((first, count)) if first == parsed => {
                    self.current = Some((first, count + 1));
                }
                Some((first, count)) => {
                    self.current = Some((parsed, 1));
                    return Ok(Some(self.finish_block(first, count)));
                }
            }
        }
    }
}

impl <R: BufRead + Send> Schedule for TraceSchedule<R> {
    fn next_unit(&mut self, _now: Instant) -> anyhow::Result<Option<WorkUnit>> {
        Ok(self.next_block()?
            .map(|block| WorkUnit {
                packet_count: block.packet_count,
                probe: block.probe,
                delay_before: Duration::from_micros(block.gap_micros),
            }))
    }

    fn describe(&self) -> String {
        format!("replay of trace {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn blocks(trace: &str) -> anyhow::Result<Vec<TraceBlock>> {
        let mut schedule = TraceSchedule::new(trace.as_bytes(), "test".to_string());
        let mut result = Vec::new();
        while let Some(block) = schedule.next_block()? {
            result.push(block);
        }
        Ok(result)
    }

    fn block(gap_micros: u64, probe: bool, packet_count: u32) -> TraceBlock {
        TraceBlock { gap_micros, probe, packet_count }
    }

    #[rstest]
    #[case::empty("", vec![])]
    #[case::only_blank_lines("\n\n  \n", vec![])]
    #[case::single("0\n", vec![block(0, false, 1)])]
    #[case::no_trailing_newline("5", vec![block(5, false, 1)])]
    #[case::mixed("0\n0\n50*\n50*\n120\n", vec![block(0, false, 2), block(50, true, 2), block(70, false, 1)])]
    #[case::blank_lines_do_not_split("0\n\n0\n\n50*\n  \n50*\n120\n", vec![block(0, false, 2), block(50, true, 2), block(70, false, 1)])]
    #[case::probe_change_same_offset("10\n10*\n10\n", vec![block(10, false, 1), block(0, true, 1), block(0, false, 1)])]
    #[case::decreasing_offset("100\n40\n", vec![block(100, false, 1), block(0, false, 1)])]
    #[case::whitespace(" 7 \n7\t\n 9 * \n", vec![block(7, false, 2), block(2, true, 1)])]
    #[case::last_block_flushed("1\n2\n2\n2\n", vec![block(1, false, 1), block(1, false, 3)])]
    fn test_grouping(#[case] trace: &str, #[case] expected: Vec<TraceBlock>) {
        assert_eq!(blocks(trace).unwrap(), expected);
    }

    #[rstest]
    #[case::text("0\nabc\n")]
    #[case::trailing_garbage("0\n12x\n")]
    #[case::only_marker("*\n")]
    #[case::float("1.5\n")]
    fn test_malformed(#[case] trace: &str) {
        assert!(blocks(trace).is_err());
    }

    #[test]
    fn test_malformed_after_valid_blocks() {
        let mut schedule = TraceSchedule::new("0\n10\nxyz\n20\n".as_bytes(), "test".to_string());

        assert_eq!(schedule.next_block().unwrap(), Some(block(0, false, 1)));
        let err = schedule.next_block().unwrap_err();
        assert!(err.to_string().contains("line 3"));
        assert_eq!(schedule.next_block().unwrap(), None);
    }

    #[tokio::test]
    async fn test_work_units() {
        let mut schedule = TraceSchedule::new("0\n0\n50*\n50*\n120\n".as_bytes(), "test".to_string());
        let now = Instant::now();

        assert_eq!(schedule.next_unit(now).unwrap(), Some(WorkUnit { packet_count: 2, probe: false, delay_before: Duration::ZERO }));
        assert_eq!(schedule.next_unit(now).unwrap(), Some(WorkUnit { packet_count: 2, probe: true, delay_before: Duration::from_micros(50) }));
        assert_eq!(schedule.next_unit(now).unwrap(), Some(WorkUnit { packet_count: 1, probe: false, delay_before: Duration::from_micros(70) }));
        assert_eq!(schedule.next_unit(now).unwrap(), None);
    }
}
