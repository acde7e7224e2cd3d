use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::select;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use crate::codec::packet::Packet;
use crate::config::ResponderConfig;
use crate::log_records::FlowLog;
use crate::responder::ResponderReport;
use crate::shutdown::ShutdownSignal;
use crate::timestamp::Timestamp;

/// Creates the log for the n-th accepted flow (counting from 1)
pub type FlowLogFactory = Box<dyn FnMut(u32) -> anyhow::Result<FlowLog> + Send>;

/// `<prefix>_<flow number>_<suffix>.log` in `dir`
pub fn flow_log_files(dir: PathBuf, prefix: String, suffix: String) -> FlowLogFactory {
    Box::new(move |flow_number: u32| {
        FlowLog::create_file(&dir.join(format!("{}_{}_{}.log", prefix, flow_number, suffix)))
    })
}

/// Accepts TCP connections and reads fixed-size packets from each of them on a task of its own,
///  logging the one-way delay of every packet. Nothing is acknowledged.
pub struct StreamReceiver {
    listener: TcpListener,
    config: ResponderConfig,
    flow_logs: FlowLogFactory,
    shutdown: Arc<ShutdownSignal>,
}

impl StreamReceiver {
    pub fn new(listener: TcpListener, config: ResponderConfig, flow_logs: FlowLogFactory, shutdown: Arc<ShutdownSignal>) -> anyhow::Result<StreamReceiver> {
        config.validate()?;
        Ok(StreamReceiver {
            listener,
            config,
            flow_logs,
            shutdown,
        })
    }

    /// Runs until shutdown. Flows that are still open then are closed without waiting for EOF.
    pub async fn run(mut self) -> ResponderReport {
        let mut flows = JoinSet::new();
        let mut num_flows = 0u32;
        let mut report = ResponderReport::default();

        loop {
            select! {
                biased;
                _ = self.shutdown.wait() => break,
                Some(finished) = flows.join_next(), if !flows.is_empty() => {
                    if let Ok(flow_report) = finished {
                        add_to(&mut report, &flow_report);
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        num_flows += 1;
                        match (self.flow_logs)(num_flows) {
                            Ok(log) => {
                                info!("flow #{} from {}", num_flows, peer);
                                flows.spawn(receive_flow(stream, peer, log, self.config.packet_size));
                            }
                            Err(e) => warn!("rejecting flow #{} from {}: {:#}", num_flows, peer, e),
                        }
                    }
                    Err(e) => warn!("error accepting connection: {}", e),
                },
            }
        }

        if !flows.is_empty() {
            info!("closing {} open flows", flows.len());
        }
        flows.shutdown().await;
        report
    }
}

fn add_to(total: &mut ResponderReport, flow: &ResponderReport) {
    total.packets_received += flow.packets_received;
    total.bytes_received += flow.bytes_received;
    total.malformed += flow.malformed;
}

/// Reads packets until EOF. A trailing partial packet is discarded.
pub async fn receive_flow<R: AsyncRead + Unpin>(mut stream: R, peer: SocketAddr, mut log: FlowLog, packet_size: usize) -> ResponderReport {
    let mut buf = vec![0u8; packet_size];
    let mut report = ResponderReport::default();

    loop {
        match stream.read_exact(&mut buf).await {
            Ok(_) => {
                let recv_time = Timestamp::now();
                report.packets_received += 1;
                report.bytes_received += packet_size as u64;

                match Packet::deser(&mut buf.as_slice()) {
                    Ok(packet) => log.record(packet.seq, recv_time, packet.send_time),
                    Err(e) => {
                        debug!("malformed packet from {}: {}", peer, e);
                        report.malformed += 1;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("flow from {} closed after {} packets", peer, report.packets_received);
                break;
            }
            Err(e) => {
                warn!("error reading from {}: {}", peer, e);
                break;
            }
        }
    }

    log.flush();
    report
}
