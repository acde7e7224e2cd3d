//! Fixed-layout binary records exchanged between sender and receiver. All numbers are in network
//!  byte order (BE), and both records have a fixed size so that sender and receiver builds agree
//!  on framing without any length prefix.
//!
//! Packet:
//! ```ascii
//!  0: seq (u32)
//!  4: send timestamp, seconds since epoch (i64)
//! 12: send timestamp, microseconds (i64)
//! 20: probe flag (u8, 0 or 1)
//! 21: zero padding up to the configured packet size
//! ```
//!
//! Ack:
//! ```ascii
//!  0: seq (u32) - copied from the packet being acknowledged
//!  4: bytes received (u64)
//! 12: receive timestamp at the receiver, seconds (i64)
//! 20: receive timestamp at the receiver, microseconds (i64)
//! 28: (optional) inter-arrival time at the receiver in seconds (f64)
//! ```

pub mod packet;
pub mod ack;
