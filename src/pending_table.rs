use std::future::Future;
use std::time::Duration;
use anyhow::bail;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use crate::timestamp::Timestamp;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingEntry {
    pub seq: u32,
    /// wall-clock send time, as stamped into the packet and written to the logs
    pub send_time: Timestamp,
    /// monotonic send time, used for calculating the round-trip time
    pub sent_at: Instant,
}

/// The table of sent-but-not-yet-acknowledged sequence numbers. This is the only piece of mutable
///  state shared between the send loop and the ack listener.
///
/// There is exactly one lock. It is held for the combination of 'send + insert' and for the
///  combination of 'lookup + remove', never nested, so the ack listener can never see a sequence
///  number whose send is still in progress.
///
/// NB: Entries that are never acknowledged stay in the table unless [PendingSendTable::evict_older_than]
///      is called - with sustained packet loss and no eviction, the table grows without bound.
#[derive(Default)]
pub struct PendingSendTable {
    entries: Mutex<FxHashMap<u32, PendingEntry>>,
}

impl PendingSendTable {
    pub fn new() -> PendingSendTable {
        Default::default()
    }

    /// Performs `send` while holding the table's lock, and inserts `entry` if and only if the send
    ///  transferred exactly `expected_len` bytes. Returns the number of bytes sent.
    ///
    /// `send` is a future, i.e. nothing is actually sent before it is awaited under the lock.
    pub async fn insert_if_sent<F>(&self, entry: PendingEntry, expected_len: usize, send: F) -> anyhow::Result<usize>
    where
        F: Future<Output = std::io::Result<usize>>,
    {
        let mut entries = self.entries.lock().await;

        let n = check_complete_send(send.await, expected_len)?;
        let seq = entry.seq;
        if entries.insert(seq, entry).is_some() {
            warn!("sequence number {} was already pending - replacing the previous entry", seq);
        }
        Ok(n)
    }

    /// Returns `None` if the sequence number is not (or no longer) pending, e.g. for a duplicate ack
    pub async fn lookup_and_remove(&self, seq: u32) -> Option<PendingEntry> {
        self.entries.lock().await
            .remove(&seq)
    }

    /// Removes all entries that were sent more than `max_age` before `now`, returning the number
    ///  of evicted entries
    pub async fn evict_older_than(&self, max_age: Duration, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let len_before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.sent_at) <= max_age);

        let num_evicted = len_before - entries.len();
        if num_evicted > 0 {
            debug!("evicted {} pending entries older than {:?}", num_evicted, max_age);
        }
        num_evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// A send counts as successful only if it transferred the entire block
pub fn check_complete_send(result: std::io::Result<usize>, expected_len: usize) -> anyhow::Result<usize> {
    match result {
        Ok(n) if n == expected_len => Ok(n),
        Ok(n) => bail!("short send: {} of {} bytes", n, expected_len),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use super::*;
    use rstest::rstest;
    use tokio::sync::oneshot;

    fn entry(seq: u32) -> PendingEntry {
        PendingEntry {
            seq,
            send_time: Timestamp { seconds: 100, micros: seq as i64 },
            sent_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_on_full_send() {
        let table = PendingSendTable::new();

        let n = table.insert_if_sent(entry(1), 10, async { Ok(10) }).await.unwrap();
        assert_eq!(n, 10);
        assert_eq!(table.len().await, 1);

        let removed = table.lookup_and_remove(1).await.unwrap();
        assert_eq!(removed.seq, 1);
        assert_eq!(removed.send_time, Timestamp { seconds: 100, micros: 1 });
        assert!(table.is_empty().await);
    }

    #[rstest]
    #[case::short_send(Ok(9))]
    #[case::nothing_sent(Ok(0))]
    #[case::io_error(Err(io::ErrorKind::ConnectionRefused))]
    #[tokio::test]
    async fn test_no_insert_on_failed_send(#[case] send_result: Result<usize, io::ErrorKind>) {
        let table = PendingSendTable::new();

        let result = table.insert_if_sent(entry(1), 10, async move { send_result.map_err(io::Error::from) }).await;
        assert!(result.is_err());
        assert!(table.is_empty().await);
        assert_eq!(table.lookup_and_remove(1).await, None);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let table = PendingSendTable::new();
        table.insert_if_sent(entry(5), 1, async { Ok(1) }).await.unwrap();

        assert!(table.lookup_and_remove(5).await.is_some());
        assert!(table.lookup_and_remove(5).await.is_none());
        assert!(table.lookup_and_remove(6).await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_waits_for_send_in_progress() {
        let table = Arc::new(PendingSendTable::new());
        let (release_send, send_released) = oneshot::channel::<()>();

        let table_for_send = table.clone();
        let send_task = tokio::spawn(async move {
            table_for_send.insert_if_sent(entry(1), 3, async move {
                let _ = send_released.await;
                Ok(3)
            }).await
        });
        // let the send task acquire the lock and block inside the send
        tokio::task::yield_now().await;

        let table_for_lookup = table.clone();
        let lookup_task = tokio::spawn(async move {
            table_for_lookup.lookup_and_remove(1).await
        });
        tokio::task::yield_now().await;

        release_send.send(()).unwrap();

        assert_eq!(send_task.await.unwrap().unwrap(), 3);
        let found = lookup_task.await.unwrap();
        assert_eq!(found.map(|e| e.seq), Some(1));
        assert!(table.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_older_than() {
        let table = PendingSendTable::new();
        table.insert_if_sent(entry(1), 1, async { Ok(1) }).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        table.insert_if_sent(entry(2), 1, async { Ok(1) }).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let num_evicted = table.evict_older_than(Duration::from_secs(3), Instant::now()).await;
        assert_eq!(num_evicted, 1);
        assert!(table.lookup_and_remove(1).await.is_none());
        assert!(table.lookup_and_remove(2).await.is_some());
    }
}
