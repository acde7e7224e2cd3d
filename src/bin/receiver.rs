use clap::{ArgAction, Parser};
use clap_derive::Parser;
use pacemeter::cli::{init_logging, shutdown_on_ctrl_c};
use pacemeter::config::ResponderConfig;
use pacemeter::connection::{bind_datagram, bind_stream};
use pacemeter::log_records::{default_log_suffix, ReceiverLog};
use pacemeter::responder::tcp_flows::{flow_log_files, StreamReceiver};
use pacemeter::responder::udp_echo::EchoResponder;
use pacemeter::shutdown::ShutdownSignal;
use pacemeter::util::format_bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Receives packets, acknowledging each of them (UDP) or just logging their one-way delay (TCP)
#[derive(Parser)]
struct Args {
    port: u16,

    /// suffix for the log file names, defaults to <date>_<time>
    #[clap(short = 's', long)]
    suffix: Option<String>,

    /// include the inter-arrival time in acks
    #[clap(long, default_value_t = false)]
    iat: bool,

    /// receive TCP streams instead of UDP packets
    #[clap(long, default_value_t = false)]
    tcp: bool,

    /// file name prefix for the per-flow logs of TCP streams
    #[clap(long, default_value = "flow")]
    prefix: String,

    /// size of packets on TCP streams
    #[clap(long)]
    packet_size: Option<usize>,

    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let suffix = args.suffix.unwrap_or_else(default_log_suffix);
    let shutdown = Arc::new(ShutdownSignal::new());
    shutdown_on_ctrl_c(shutdown.clone());

    let report = if args.tcp {
        let mut config = ResponderConfig::default_stream();
        if let Some(packet_size) = args.packet_size {
            config.packet_size = packet_size;
        }

        let listener = bind_stream(args.port)?;
        StreamReceiver::new(listener, config, flow_log_files(PathBuf::from("."), args.prefix, suffix), shutdown)?
            .run().await
    }
    else {
        let mut config = ResponderConfig::default_datagram();
        config.report_inter_arrival = args.iat;
        if let Some(packet_size) = args.packet_size {
            config.packet_size = packet_size;
        }

        let socket = bind_datagram(args.port).await?;
        let log = ReceiverLog::create_file(&PathBuf::from(format!("receiver_{}.log", suffix)))?;
        EchoResponder::new(socket, config, log, shutdown)?
            .run().await
    };

    info!("received {} packets ({}), {} malformed, {} acks sent",
        report.packets_received, format_bytes(report.bytes_received), report.malformed, report.acks_sent);
    Ok(())
}
