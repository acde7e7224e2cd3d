use std::io;
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::{mpsc, Mutex};
use crate::codec::ack::Ack;
use crate::timestamp::Timestamp;
use crate::transport::AckSource;

/// Creates an [AckSource] that returns whatever is pushed into the corresponding [AckScript].
///  Once the script is exhausted, `recv_ack` blocks forever like a socket that receives nothing.
pub fn scripted_ack_source() -> (AckScript, ScriptedAckSource) {
    let (send, recv) = mpsc::unbounded_channel();
    (AckScript { send }, ScriptedAckSource { recv: Mutex::new(recv) })
}

#[derive(Clone)]
pub struct AckScript {
    send: mpsc::UnboundedSender<io::Result<Vec<u8>>>,
}

impl AckScript {
    pub fn ack(&self, seq: u32, bytes_acked: u64) {
        let ack = Ack {
            seq,
            bytes_acked,
            recv_time: Timestamp::now(),
            inter_arrival_secs: None,
        };
        let mut buf = BytesMut::new();
        ack.ser(&mut buf);
        self.raw(buf.to_vec());
    }

    pub fn raw(&self, data: Vec<u8>) {
        // the receiving side going away just means nobody listens anymore
        let _ = self.send.send(Ok(data));
    }

    pub fn error(&self, kind: io::ErrorKind) {
        let _ = self.send.send(Err(kind.into()));
    }
}

pub struct ScriptedAckSource {
    recv: Mutex<mpsc::UnboundedReceiver<io::Result<Vec<u8>>>>,
}

#[async_trait]
impl AckSource for ScriptedAckSource {
    async fn recv_ack(&self, buf: &mut [u8]) -> io::Result<usize> {
        let next = self.recv.lock().await
            .recv().await;

        match next {
            Some(Ok(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => std::future::pending().await,
        }
    }
}
