pub mod codec;
pub mod config;
pub mod timestamp;
pub mod pending_table;
pub mod schedule;
pub mod transport;
pub mod transmitter;
pub mod ack_listener;
pub mod session;
pub mod stats;
pub mod shutdown;
pub mod log_records;
pub mod connection;
pub mod responder;
pub mod util;
pub mod cli;
pub mod test_util;
