//! Test doubles for the I/O seams of a session. They are part of the regular (non-#[cfg(test)])
//!  code so that integration tests can use them as well.

pub mod shared_buf;
pub mod scripted_acks;
pub mod loopback;
