use std::sync::Arc;
use anyhow::anyhow;
use bytes::BytesMut;
use tokio::time::Instant;
use tracing::{trace, warn};
use crate::codec::packet::Packet;
use crate::log_records::SentLog;
use crate::pending_table::{check_complete_send, PendingEntry, PendingSendTable};
use crate::stats::SessionStats;
use crate::timestamp::Timestamp;
use crate::transport::PacketSink;

/// Builds blocks of identical packets and hands them to the network. Each block gets the next
///  sequence number, starting at 1, regardless of whether sending the previous block succeeded.
pub struct Transmitter {
    sink: Arc<dyn PacketSink>,
    /// `None` if nobody listens for acks, e.g. on a TCP stream
    table: Option<Arc<PendingSendTable>>,
    stats: Arc<SessionStats>,
    sent_log: SentLog,
    packet_size: usize,
    last_seq: u32,
    send_buf: BytesMut,
}

impl Transmitter {
    pub fn new(sink: Arc<dyn PacketSink>, table: Option<Arc<PendingSendTable>>, stats: Arc<SessionStats>, sent_log: SentLog, packet_size: usize) -> Transmitter {
        Transmitter {
            sink,
            table,
            stats,
            sent_log,
            packet_size,
            last_seq: 0,
            send_buf: BytesMut::with_capacity(packet_size),
        }
    }

    /// Sends a block of `packet_count` packets, returning its sequence number if the whole block
    ///  went out. A failed send is logged and counted, but it is not an error - the session goes
    ///  on with the next block.
    ///
    /// Returns an error only if the session can not continue, i.e. if sequence numbers are
    ///  exhausted.
    pub async fn send_block(&mut self, packet_count: u32, probe: bool) -> anyhow::Result<Option<u32>> {
        let seq = self.last_seq.checked_add(1)
            .ok_or_else(|| anyhow!("sequence numbers exhausted after {} blocks", self.last_seq))?;
        self.last_seq = seq;

        let send_time = Timestamp::now();
        let sent_at = Instant::now();

        self.send_buf.clear();
        let packet = Packet { seq, send_time, probe };
        for _ in 0..packet_count {
            packet.ser(&mut self.send_buf, self.packet_size);
        }
        let expected_len = self.send_buf.len();

        let send = self.sink.send_block(&self.send_buf, self.packet_size);
        let result = match &self.table {
            Some(table) => table.insert_if_sent(PendingEntry { seq, send_time, sent_at }, expected_len, send).await,
            None => check_complete_send(send.await, expected_len),
        };

        match result {
            Ok(num_bytes) => {
                trace!("sent block #{} with {} packets ({} bytes)", seq, packet_count, num_bytes);
                self.stats.on_block_sent(num_bytes);
                self.sent_log.record(seq, num_bytes, send_time);
                Ok(Some(seq))
            }
            Err(e) => {
                warn!("error sending block #{}: {}", seq, e);
                self.stats.on_send_failure();
                Ok(None)
            }
        }
    }

    pub fn last_seq(&self) -> u32 {
        self.last_seq
    }

    /// Releases the sent log for flushing when the session terminates
    pub fn into_sent_log(self) -> SentLog {
        self.sent_log
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;
    use super::*;
    use crate::test_util::shared_buf::SharedBuf;
    use crate::transport::MockPacketSink;

    const PACKET_SIZE: usize = 32;

    fn transmitter(sink: MockPacketSink, table: Option<Arc<PendingSendTable>>) -> (Transmitter, Arc<SessionStats>, SharedBuf) {
        let stats = Arc::new(SessionStats::new(0.5));
        let buf = SharedBuf::new();
        let sent_log = SentLog::new("sent", Box::new(buf.clone())).unwrap();
        (Transmitter::new(Arc::new(sink), table, stats.clone(), sent_log, PACKET_SIZE), stats, buf)
    }

    #[tokio::test]
    async fn test_block_shares_sequence_number() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_in_mock = captured.clone();

        let mut sink = MockPacketSink::new();
        sink.expect_send_block()
            .withf(|block, packet_size| block.len() == 3 * PACKET_SIZE && *packet_size == PACKET_SIZE)
            .times(1)
            .returning(move |block, _| {
                captured_in_mock.lock().unwrap().push(block.to_vec());
                Ok(block.len())
            });

        let table = Arc::new(PendingSendTable::new());
        let (mut transmitter, stats, log) = transmitter(sink, Some(table.clone()));

        assert_eq!(transmitter.send_block(3, true).await.unwrap(), Some(1));

        let block = captured.lock().unwrap().remove(0);
        let packets = block.chunks(PACKET_SIZE)
            .map(|mut p| Packet::deser(&mut p).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| p.seq == 1 && p.probe && p.send_time == packets[0].send_time));

        let entry = table.lookup_and_remove(1).await.unwrap();
        assert_eq!(entry.send_time, packets[0].send_time);

        assert_eq!(stats.snapshot().bytes_sent, 3 * PACKET_SIZE as u64);
        assert_eq!(log.lines()[1], format!("1,{},{}", 3 * PACKET_SIZE, packets[0].send_time));
    }

    #[tokio::test]
    async fn test_failed_send_is_not_recorded() {
        let mut sink = MockPacketSink::new();
        let mut call = 0;
        sink.expect_send_block()
            .times(3)
            .returning(move |block, _| {
                call += 1;
                match call {
                    1 => Ok(block.len()),
                    2 => Ok(block.len() - 1),
                    _ => Err(io::ErrorKind::ConnectionRefused.into()),
                }
            });

        let table = Arc::new(PendingSendTable::new());
        let (mut transmitter, stats, log) = transmitter(sink, Some(table.clone()));

        assert_eq!(transmitter.send_block(1, false).await.unwrap(), Some(1));
        assert_eq!(transmitter.send_block(1, false).await.unwrap(), None);
        assert_eq!(transmitter.send_block(1, false).await.unwrap(), None);
        assert_eq!(transmitter.last_seq(), 3);

        assert_eq!(table.len().await, 1);
        assert!(table.lookup_and_remove(1).await.is_some());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.blocks_sent, 1);
        assert_eq!(snapshot.send_failures, 2);
        assert_eq!(log.lines().len(), 2);
    }

    #[tokio::test]
    async fn test_without_table() {
        let mut sink = MockPacketSink::new();
        sink.expect_send_block()
            .times(2)
            .returning(|block, _| Ok(block.len()));

        let (mut transmitter, stats, log) = transmitter(sink, None);
        assert_eq!(transmitter.send_block(2, false).await.unwrap(), Some(1));
        assert_eq!(transmitter.send_block(2, false).await.unwrap(), Some(2));

        assert_eq!(stats.snapshot().blocks_sent, 2);
        assert_eq!(log.lines().len(), 3);
    }

    #[tokio::test]
    async fn test_sequence_numbers_exhausted() {
        let mut sink = MockPacketSink::new();
        sink.expect_send_block()
            .times(1)
            .returning(|block, _| Ok(block.len()));

        let (mut transmitter, _, _) = transmitter(sink, None);
        transmitter.last_seq = u32::MAX - 1;

        assert_eq!(transmitter.send_block(1, false).await.unwrap(), Some(u32::MAX));
        assert!(transmitter.send_block(1, false).await.is_err());
    }
}
