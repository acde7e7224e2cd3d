use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tracing::trace;

/// This is an abstraction for handing a block of packets to the network, introduced to facilitate
///  mocking the I/O part away for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PacketSink: Send + Sync + 'static {
    /// Sends `block`, which consists of packets of `packet_size` bytes each, as a single transport
    ///  operation. Returns the number of bytes actually sent, which can be less than the block's
    ///  length.
    async fn send_block(&self, block: &[u8], packet_size: usize) -> io::Result<usize>;
}

/// The receiving half for acks, abstracted for the same reason as [PacketSink]
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AckSource: Send + Sync + 'static {
    /// Blocks until an ack arrives, returning its length in `buf`
    async fn recv_ack(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// A connected UDP socket sends each packet of a block as a datagram of its own
#[async_trait]
impl PacketSink for Arc<UdpSocket> {
    async fn send_block(&self, block: &[u8], packet_size: usize) -> io::Result<usize> {
        let mut num_sent = 0;
        for packet in block.chunks(packet_size) {
            let n = self.send(packet).await?;
            num_sent += n;
            if n < packet.len() {
                trace!("truncated datagram: {} of {} bytes", n, packet.len());
                break;
            }
        }
        Ok(num_sent)
    }
}

#[async_trait]
impl AckSource for Arc<UdpSocket> {
    async fn recv_ack(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf).await
    }
}

/// The sending side of a TCP connection. A block goes out as a single write of all its bytes.
pub struct StreamSink {
    stream: Mutex<TcpStream>,
}

impl StreamSink {
    pub fn new(stream: TcpStream) -> StreamSink {
        StreamSink {
            stream: Mutex::new(stream),
        }
    }

    pub async fn shutdown(&self) -> io::Result<()> {
        self.stream.lock().await
            .shutdown().await
    }
}

#[async_trait]
impl PacketSink for StreamSink {
    async fn send_block(&self, block: &[u8], _packet_size: usize) -> io::Result<usize> {
        self.stream.lock().await
            .write_all(block).await?;
        Ok(block.len())
    }
}
