use std::io;
use std::sync::Mutex;
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use crate::codec::packet::Packet;
use crate::test_util::scripted_acks::AckScript;
use crate::transport::PacketSink;

/// A [PacketSink] that records every block and answers it with an ack through an [AckScript],
///  simulating a well-behaved echo responder without any network
pub struct LoopbackSink {
    acks: AckScript,
    blocks: Mutex<Vec<Vec<u8>>>,
    lost: FxHashSet<u32>,
    failing: FxHashSet<u32>,
    duplicate_acks: bool,
}

impl LoopbackSink {
    pub fn new(acks: AckScript) -> LoopbackSink {
        LoopbackSink {
            acks,
            blocks: Default::default(),
            lost: Default::default(),
            failing: Default::default(),
            duplicate_acks: false,
        }
    }

    /// blocks with these sequence numbers are 'lost', i.e. never acknowledged
    pub fn with_lost(mut self, seqs: impl IntoIterator<Item = u32>) -> LoopbackSink {
        self.lost.extend(seqs);
        self
    }

    /// sending blocks with these sequence numbers fails, so they are neither recorded nor acknowledged
    pub fn with_failing(mut self, seqs: impl IntoIterator<Item = u32>) -> LoopbackSink {
        self.failing.extend(seqs);
        self
    }

    /// acknowledge every block twice
    pub fn with_duplicate_acks(mut self) -> LoopbackSink {
        self.duplicate_acks = true;
        self
    }

    pub fn sent_blocks(&self) -> Vec<Vec<u8>> {
        self.blocks.lock().unwrap().clone()
    }

    pub fn sent_seqs(&self) -> Vec<u32> {
        self.sent_blocks().iter()
            .filter_map(|b| Packet::deser(&mut b.as_slice()).ok())
            .map(|p| p.seq)
            .collect()
    }
}

#[async_trait]
impl PacketSink for LoopbackSink {
    async fn send_block(&self, block: &[u8], _packet_size: usize) -> io::Result<usize> {
        let packet = Packet::deser(&mut &block[..])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if self.failing.contains(&packet.seq) {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        self.blocks.lock().unwrap()
            .push(block.to_vec());

        if !self.lost.contains(&packet.seq) {
            self.acks.ack(packet.seq, block.len() as u64);
            if self.duplicate_acks {
                self.acks.ack(packet.seq, block.len() as u64);
            }
        }
        Ok(block.len())
    }
}
