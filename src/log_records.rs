//! Append-only CSV logs of the measurement results. Each log has exactly one writer. The only
//!  shared one is the round-trip log, which is written by the ack listener and flushed by the
//!  session driver (see [SharedRoundTripLog]).

use std::fmt::Arguments;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use anyhow::Context;
use tracing::{debug, warn};
use crate::timestamp::Timestamp;

pub fn default_log_suffix() -> String {
    chrono::Local::now()
        .format("%Y%m%d_%H%M")
        .to_string()
}

struct CsvLog {
    name: String,
    writer: Box<dyn Write + Send>,
}

impl CsvLog {
    fn new(name: String, writer: Box<dyn Write + Send>, header: &str) -> anyhow::Result<CsvLog> {
        let mut result = CsvLog { name, writer };
        writeln!(result.writer, "{}", header)
            .with_context(|| format!("unable to write header of {}", result.name))?;
        Ok(result)
    }

    fn create_file(path: &Path, header: &str) -> anyhow::Result<CsvLog> {
        let file = File::create(path)
            .with_context(|| format!("unable to access {:?}", path))?;
        Self::new(path.display().to_string(), Box::new(BufWriter::new(file)), header)
    }

    /// NB: A failing write is reported but does not stop the measurement
    fn write_row(&mut self, row: Arguments) {
        if let Err(e) = self.writer.write_fmt(row).and_then(|_| self.writer.write_all(b"\n")) {
            warn!("error writing to {}: {}", self.name, e);
        }
    }

    fn flush(&mut self) {
        debug!("flushing {}", self.name);
        if let Err(e) = self.writer.flush() {
            warn!("error flushing {}: {}", self.name, e);
        }
    }
}

macro_rules! csv_log {
    ($(#[$meta:meta])* $name:ident, $header:literal) => {
        $(#[$meta])*
        pub struct $name(CsvLog);

        impl $name {
            pub const HEADER: &'static str = $header;

            pub fn new(name: impl Into<String>, writer: Box<dyn Write + Send>) -> anyhow::Result<$name> {
                Ok($name(CsvLog::new(name.into(), writer, Self::HEADER)?))
            }

            pub fn create_file(path: &Path) -> anyhow::Result<$name> {
                Ok($name(CsvLog::create_file(path, Self::HEADER)?))
            }

            pub fn flush(&mut self) {
                self.0.flush()
            }
        }
    };
}

csv_log!(
    /// one row per successfully sent block (or packet)
    SentLog, "seq,bytes,time_sent"
);
csv_log!(
    /// one row per matched ack
    RoundTripLog, "seq,bytes,time_sent,time_recv,time_rt"
);
csv_log!(
    /// one row per datagram received by the echo responder
    ReceiverLog, "host,port,seq,bytes,time_sent,time_recv"
);
csv_log!(
    /// one row per packet received on a stream, with the one-way delay in seconds
    FlowLog, "seq,time_recv,time_sent,delay_s"
);

impl SentLog {
    pub fn record(&mut self, seq: u32, num_bytes: usize, time_sent: Timestamp) {
        self.0.write_row(format_args!("{},{},{}", seq, num_bytes, time_sent));
    }
}

impl RoundTripLog {
    pub fn record(&mut self, seq: u32, num_bytes: u64, time_sent: Timestamp, time_recv: Timestamp, time_rt: Timestamp) {
        self.0.write_row(format_args!("{},{},{},{},{}", seq, num_bytes, time_sent, time_recv, time_rt));
    }
}

/// Handle to a [RoundTripLog] that outlives the task writing it, so the log can be flushed even
///  if that task is cancelled
#[derive(Clone)]
pub struct SharedRoundTripLog(Arc<Mutex<RoundTripLog>>);

impl SharedRoundTripLog {
    pub fn new(log: RoundTripLog) -> SharedRoundTripLog {
        SharedRoundTripLog(Arc::new(Mutex::new(log)))
    }

    /// NB: The lock must not be held across an `.await`
    pub fn lock(&self) -> MutexGuard<'_, RoundTripLog> {
        self.0.lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReceiverLog {
    pub fn record(&mut self, host: &str, port: u16, seq: u32, num_bytes: usize, time_sent: Timestamp, time_recv: Timestamp) {
        self.0.write_row(format_args!("{},{},{},{},{},{}", host, port, seq, num_bytes, time_sent, time_recv));
    }
}

impl FlowLog {
    pub fn record(&mut self, seq: u32, time_recv: Timestamp, time_sent: Timestamp) {
        // may be negative if the clocks of sender and receiver are not in sync
        let delay_secs = time_recv.secs_since(time_sent);
        self.0.write_row(format_args!("{},{},{},{:.6}", seq, time_recv, time_sent, delay_secs));
    }
}
