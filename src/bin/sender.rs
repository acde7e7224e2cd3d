use clap::{ArgAction, ArgGroup, Parser};
use clap_derive::Parser;
use pacemeter::cli::{init_logging, log_session_summary, shutdown_on_ctrl_c};
use pacemeter::config::{SendMode, SessionConfig};
use pacemeter::connection::connect_stream;
use pacemeter::log_records::{default_log_suffix, SentLog};
use pacemeter::session::Session;
use pacemeter::transport::StreamSink;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Sends blocks of packets over a TCP connection
#[derive(Parser)]
#[clap(group(ArgGroup::new("mode").args(["ttr", "num_blocks", "trace_file"])))]
struct Args {
    server_ip: IpAddr,
    port: u16,

    /// time to run in seconds (this is the default, for 10 seconds)
    #[clap(short = 't', long)]
    ttr: Option<u64>,

    /// number of blocks to send
    #[clap(short = 'n', long = "blocks")]
    num_blocks: Option<u32>,

    /// trace file with packet offsets in microseconds, '*' marking probe packets
    #[clap(short = 'f', long = "trace")]
    trace_file: Option<PathBuf>,

    /// packets per block
    #[clap(short = 'b', long = "block-size", default_value_t = SessionConfig::DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// flag packets in time-to-run and block mode as probe packets
    #[clap(long, default_value_t = false)]
    probe: bool,

    /// TCP congestion control algorithm
    #[clap(short = 'C', long)]
    congestion_control: Option<String>,

    /// sent log, defaults to sender_<date>_<time>.log
    #[clap(short = 'l', long)]
    logfile: Option<PathBuf>,

    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mode = match (args.ttr, args.num_blocks, args.trace_file) {
        (_, Some(n), _) => SendMode::BlockCount(n),
        (_, _, Some(path)) => SendMode::Trace(path),
        (Some(secs), _, _) => SendMode::TimeToRun(Duration::from_secs(secs)),
        (None, None, None) => SendMode::TimeToRun(SessionConfig::DEFAULT_TTR),
    };
    let mut config = SessionConfig::new_stream(mode);
    config.block_size = args.block_size;
    config.probe = args.probe;
    config.validate()?;

    let log_path = args.logfile
        .unwrap_or_else(|| PathBuf::from(format!("sender_{}.log", default_log_suffix())));
    let sent_log = SentLog::create_file(&log_path)?;

    let stream = connect_stream(SocketAddr::new(args.server_ip, args.port), args.congestion_control).await?;
    let sink = Arc::new(StreamSink::new(stream));

    let session = Session::new(config, sink.clone(), sent_log)?;
    shutdown_on_ctrl_c(session.shutdown_signal());

    let report = session.run().await?;
    if let Err(e) = sink.shutdown().await {
        warn!("error closing the connection: {}", e);
    }

    log_session_summary(&report);
    Ok(())
}
