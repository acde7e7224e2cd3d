use std::net::SocketAddr;
use std::sync::Arc;
use bytes::BytesMut;
use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tokio::select;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use crate::codec::ack::Ack;
use crate::codec::packet::Packet;
use crate::config::ResponderConfig;
use crate::log_records::ReceiverLog;
use crate::responder::ResponderReport;
use crate::shutdown::ShutdownSignal;
use crate::timestamp::Timestamp;

/// Answers each received datagram with exactly one ack, carrying the packet's sequence number,
///  the arrival time and the number of bytes received
pub struct EchoResponder {
    socket: UdpSocket,
    config: ResponderConfig,
    log: ReceiverLog,
    shutdown: Arc<ShutdownSignal>,
    /// for inter-arrival times, tracked per sender
    last_arrival: FxHashMap<SocketAddr, Instant>,
    report: ResponderReport,
}

impl EchoResponder {
    pub fn new(socket: UdpSocket, config: ResponderConfig, log: ReceiverLog, shutdown: Arc<ShutdownSignal>) -> anyhow::Result<EchoResponder> {
        config.validate()?;
        Ok(EchoResponder {
            socket,
            config,
            log,
            shutdown,
            last_arrival: Default::default(),
            report: Default::default(),
        })
    }

    pub async fn run(mut self) -> ResponderReport {
        info!("echo responder listening on {:?}", self.socket.local_addr());

        // big enough for any datagram, so that oversized packets are not silently truncated
        let mut buf = vec![0u8; 65536];
        let mut ack_buf = BytesMut::with_capacity(Ack::SERIALIZED_LEN_WITH_IAT);

        loop {
            select! {
                biased;
                _ = self.shutdown.wait() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((n, peer)) => {
                        let recv_at = Instant::now();
                        let recv_time = Timestamp::now();
                        self.on_datagram(&buf[..n], peer, recv_time, recv_at, &mut ack_buf).await;
                    }
                    Err(e) => warn!("error receiving packet: {}", e),
                },
            }
        }

        self.log.flush();
        info!("echo responder shutting down: {:?}", self.report);
        self.report
    }

    async fn on_datagram(&mut self, mut datagram: &[u8], peer: SocketAddr, recv_time: Timestamp, recv_at: Instant, ack_buf: &mut BytesMut) {
        let num_bytes = datagram.len();
        self.report.packets_received += 1;
        self.report.bytes_received += num_bytes as u64;

        let packet = match Packet::deser(&mut datagram) {
            Ok(p) => p,
            Err(e) => {
                warn!("received malformed packet from {} - not acknowledging it: {}", peer, e);
                self.report.malformed += 1;
                return;
            }
        };
        if num_bytes != self.config.packet_size {
            trace!("packet #{} from {} has {} bytes, expected {}", packet.seq, peer, num_bytes, self.config.packet_size);
        }

        let inter_arrival = self.last_arrival.insert(peer, recv_at)
            .map(|prev| recv_at.saturating_duration_since(prev).as_secs_f64())
            .unwrap_or(0.0);

        let ack = Ack {
            seq: packet.seq,
            bytes_acked: num_bytes as u64,
            recv_time,
            inter_arrival_secs: self.config.report_inter_arrival.then_some(inter_arrival),
        };
        ack_buf.clear();
        ack.ser(ack_buf);

        match self.socket.send_to(&ack_buf[..], peer).await {
            Ok(_) => self.report.acks_sent += 1,
            Err(e) => debug!("error sending ack for #{} to {}: {}", packet.seq, peer, e),
        }

        self.log.record(&peer.ip().to_string(), peer.port(), packet.seq, num_bytes, packet.send_time, recv_time);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use super::*;
    use crate::test_util::shared_buf::SharedBuf;

    async fn start(report_inter_arrival: bool) -> (SocketAddr, Arc<ShutdownSignal>, tokio::task::JoinHandle<ResponderReport>, SharedBuf) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let shutdown = Arc::new(ShutdownSignal::new());
        let log = SharedBuf::new();

        let config = ResponderConfig { packet_size: 64, report_inter_arrival };
        let responder = EchoResponder::new(socket, config, ReceiverLog::new("recv", Box::new(log.clone())).unwrap(), shutdown.clone()).unwrap();
        (addr, shutdown, tokio::spawn(responder.run()), log)
    }

    fn packet(seq: u32) -> Vec<u8> {
        let mut buf = BytesMut::new();
        Packet { seq, send_time: Timestamp { seconds: 3, micros: 4 }, probe: false }
            .ser(&mut buf, 64);
        buf.to_vec()
    }

    async fn recv_ack(client: &UdpSocket) -> Ack {
        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(5), client.recv(&mut buf)).await
            .expect("no ack received")
            .unwrap();
        Ack::deser(&mut &buf[..n]).unwrap()
    }

    #[tokio::test]
    async fn test_one_ack_per_packet() {
        let (addr, shutdown, responder, log) = start(false).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();

        client.send(&packet(1)).await.unwrap();
        let ack = recv_ack(&client).await;
        assert_eq!(ack.seq, 1);
        assert_eq!(ack.bytes_acked, 64);
        assert_eq!(ack.inter_arrival_secs, None);

        client.send(&packet(2)).await.unwrap();
        assert_eq!(recv_ack(&client).await.seq, 2);

        shutdown.trigger();
        let report = responder.await.unwrap();
        assert_eq!(report, ResponderReport { packets_received: 2, bytes_received: 128, acks_sent: 2, malformed: 0 });

        let lines = log.lines();
        assert_eq!(lines.len(), 3);
        let client_port = client.local_addr().unwrap().port();
        assert!(lines[1].starts_with(&format!("127.0.0.1,{},1,64,3.000004,", client_port)));
    }

    #[tokio::test]
    async fn test_inter_arrival_time() {
        let (addr, shutdown, responder, _) = start(true).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();

        client.send(&packet(1)).await.unwrap();
        assert_eq!(recv_ack(&client).await.inter_arrival_secs, Some(0.0));

        tokio::time::sleep(Duration::from_millis(20)).await;
        client.send(&packet(2)).await.unwrap();
        let iat = recv_ack(&client).await.inter_arrival_secs.unwrap();
        assert!(iat >= 0.015, "{}", iat);

        shutdown.trigger();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_packet_is_not_acknowledged() {
        let (addr, shutdown, responder, _) = start(false).await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(addr).await.unwrap();

        client.send(&[1, 2, 3]).await.unwrap();
        client.send(&packet(7)).await.unwrap();
        assert_eq!(recv_ack(&client).await.seq, 7);

        shutdown.trigger();
        let report = responder.await.unwrap();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.acks_sent, 1);
    }
}
