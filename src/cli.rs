//! Plumbing shared by the command line binaries

use std::sync::Arc;
use tracing::{info, warn, Level};
use crate::session::SessionReport;
use crate::shutdown::ShutdownSignal;
use crate::util::format_bytes;

pub fn log_level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

pub fn init_logging(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_max_level(log_level(verbosity))
        .try_init()
        .ok();
}

/// Ctrl-C triggers `shutdown`, the process then terminates through the regular shutdown sequence
pub fn shutdown_on_ctrl_c(shutdown: Arc<ShutdownSignal>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupted - shutting down");
                shutdown.trigger();
            }
            Err(e) => warn!("unable to listen for Ctrl-C: {}", e),
        }
    });
}

pub fn log_session_summary(report: &SessionReport) {
    let stats = &report.stats;
    info!("transferred a total of {}", format_bytes(stats.bytes_sent));
    info!("{} blocks sent, {} send failures, {} acks matched, {} unmatched, {} evicted, {} outstanding",
        stats.blocks_sent, stats.send_failures, stats.acks_matched, stats.acks_unmatched, stats.evicted, report.pending_remaining);

    if let (Some(min), Some(max), Some(mean)) = (stats.rtt_min, stats.rtt_max, stats.rtt_moving_mean_millis) {
        info!("rtt min={:?} max={:?} moving avg={:.3}ms stddev={:.3}ms", min, max, mean, stats.rtt_moving_std_dev_millis);
    }
    if report.listener_cancelled {
        warn!("ack listener had to be cancelled");
    }
    if report.failed {
        warn!("ABNORMAL TERMINATION");
    }
}
