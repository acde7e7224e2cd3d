use clap::{ArgAction, Parser};
use clap_derive::Parser;
use pacemeter::cli::{init_logging, log_session_summary, shutdown_on_ctrl_c};
use pacemeter::codec::packet::DEFAULT_DATAGRAM_PACKET_SIZE;
use pacemeter::config::SessionConfig;
use pacemeter::connection::connect_datagram;
use pacemeter::log_records::{default_log_suffix, RoundTripLog, SentLog};
use pacemeter::session::Session;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Sends paced single packets over UDP, measuring the round-trip time of each
#[derive(Parser)]
struct Args {
    server_ip: IpAddr,
    port: u16,

    /// time to run in seconds
    #[clap(short = 't', long, default_value_t = 10)]
    ttr: u64,

    /// maximum bandwidth in Mbit/s, unpaced if omitted
    #[clap(short = 'b', long = "max-bandwidth")]
    max_bandwidth_mbps: Option<u32>,

    /// suffix for the log file names, defaults to <date>_<time>
    #[clap(short = 's', long)]
    suffix: Option<String>,

    #[clap(long, default_value_t = DEFAULT_DATAGRAM_PACKET_SIZE)]
    packet_size: usize,

    /// evict sends that were not acknowledged after this many milliseconds
    #[clap(long)]
    max_age_ms: Option<u64>,

    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = SessionConfig::new_datagram(Duration::from_secs(args.ttr), args.max_bandwidth_mbps);
    config.packet_size = args.packet_size;
    config.pending_max_age = args.max_age_ms.map(Duration::from_millis);
    config.validate()?;

    let suffix = args.suffix.unwrap_or_else(default_log_suffix);
    let sent_log = SentLog::create_file(&PathBuf::from(format!("sender_{}.log", suffix)))?;
    let round_trip_log = RoundTripLog::create_file(&PathBuf::from(format!("roundtrip_{}.log", suffix)))?;

    let socket = connect_datagram(SocketAddr::new(args.server_ip, args.port)).await?;

    let session = Session::new(config, Arc::new(socket.clone()), sent_log)?
        .with_acks(Arc::new(socket), round_trip_log);
    shutdown_on_ctrl_c(session.shutdown_signal());

    let report = session.run().await?;
    log_session_summary(&report);
    Ok(())
}
