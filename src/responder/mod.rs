//! The receiving side of a measurement: a UDP echo responder answering every packet with an ack,
//!  and a TCP stream receiver that only logs one-way delays.

pub mod udp_echo;
pub mod tcp_flows;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponderReport {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub acks_sent: u64,
    pub malformed: u64,
}
