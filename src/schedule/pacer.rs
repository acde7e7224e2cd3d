use std::time::Duration;
use tokio::time::Instant;

/// Turns relative delays into absolute deadlines, so that time spent sending does not add up
///  as drift over a long session.
///
/// If the sender falls behind (a deadline is already in the past), the schedule is re-anchored at
///  the current time instead of sending a catch-up burst.
#[derive(Default)]
pub struct Pacer {
    last_deadline: Option<Instant>,
}

impl Pacer {
    pub fn new() -> Pacer {
        Default::default()
    }

    pub fn next_deadline(&mut self, delay_before: Duration, now: Instant) -> Instant {
        let deadline = match self.last_deadline {
            None => now + delay_before,
            Some(prev) => {
                let deadline = prev + delay_before;
                if deadline < now { now } else { deadline }
            }
        };
        self.last_deadline = Some(deadline);
        deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadlines_do_not_drift() {
        let mut pacer = Pacer::new();
        let start = Instant::now();
        let interval = Duration::from_millis(1);

        assert_eq!(pacer.next_deadline(Duration::ZERO, start), start);
        // sending took 300us, the next deadline is still relative to the previous one
        assert_eq!(pacer.next_deadline(interval, start + Duration::from_micros(300)), start + interval);
        assert_eq!(pacer.next_deadline(interval, start + Duration::from_micros(1200)), start + 2 * interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reanchor_when_behind() {
        let mut pacer = Pacer::new();
        let start = Instant::now();
        let interval = Duration::from_millis(1);

        pacer.next_deadline(Duration::ZERO, start);
        let late = start + Duration::from_millis(5);
        assert_eq!(pacer.next_deadline(interval, late), late);
        assert_eq!(pacer.next_deadline(interval, late), late + interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_delay_is_relative_to_now() {
        let mut pacer = Pacer::new();
        let start = Instant::now();
        assert_eq!(pacer.next_deadline(Duration::from_micros(50), start), start + Duration::from_micros(50));
    }
}
