use std::fmt::{Display, Formatter};
use std::time::SystemTime;

const MICROS_PER_SEC: i64 = 1_000_000;

/// Wall-clock time with microsecond resolution, split into seconds and microseconds since the
///  epoch. This is the representation that goes on the wire and into the CSV logs.
///
/// NB: Wall-clock time can jump, so round-trip times are *not* computed from these values but
///      from a monotonic instant recorded alongside (see [crate::pending_table::PendingEntry]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub micros: i64,
}

impl Timestamp {
    pub fn now() -> Timestamp {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_system_time(t: SystemTime) -> Timestamp {
        match t.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(d) => Timestamp {
                seconds: d.as_secs() as i64,
                micros: d.subsec_micros() as i64,
            },
            Err(e) => {
                // before the epoch: keep micros in 0..1_000_000 and carry into seconds
                let total = -(e.duration().as_micros() as i64);
                Self::from_total_micros(total)
            }
        }
    }

    pub fn from_total_micros(total: i64) -> Timestamp {
        Timestamp {
            seconds: total.div_euclid(MICROS_PER_SEC),
            micros: total.rem_euclid(MICROS_PER_SEC),
        }
    }

    /// Widened to `i128` because either field may come off the wire with an arbitrary value
    fn total_micros(&self) -> i128 {
        self.seconds as i128 * MICROS_PER_SEC as i128 + self.micros as i128
    }

    /// Signed difference in seconds, negative if `earlier` is actually later than `self`
    pub fn secs_since(&self, earlier: Timestamp) -> f64 {
        (self.total_micros() - earlier.total_micros()) as f64 / 1e6
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.seconds, self.micros)
    }
}
