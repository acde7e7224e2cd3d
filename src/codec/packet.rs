use anyhow::bail;
use bytes::{Buf, BufMut, BytesMut};
use crate::timestamp::Timestamp;

/// 1500 bytes Ethernet MTU minus 20 bytes IPv4 header minus 8 bytes UDP header
pub const DEFAULT_DATAGRAM_PACKET_SIZE: usize = 1472;
/// Records on a TCP stream are not bound by datagram limits, so they use the full MTU
pub const DEFAULT_STREAM_PACKET_SIZE: usize = 1500;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub seq: u32,
    pub send_time: Timestamp,
    pub probe: bool,
}

impl Packet {
    pub const HEADER_LEN: usize = size_of::<u32>() + 2*size_of::<i64>() + size_of::<u8>();

    /// Appends this packet to `buf`, zero-padded to exactly `packet_size` bytes
    pub fn ser(&self, buf: &mut BytesMut, packet_size: usize) {
        debug_assert!(packet_size >= Self::HEADER_LEN);

        buf.put_u32(self.seq);
        buf.put_i64(self.send_time.seconds);
        buf.put_i64(self.send_time.micros);
        buf.put_u8(self.probe as u8);
        buf.put_bytes(0, packet_size.saturating_sub(Self::HEADER_LEN));
    }

    /// Parses the header, leaving the padding in `buf`
    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<Packet> {
        if buf.remaining() < Self::HEADER_LEN {
            bail!("packet too short: {} bytes, expected at least {}", buf.remaining(), Self::HEADER_LEN);
        }

        let seq = buf.get_u32();
        let seconds = buf.get_i64();
        let micros = buf.get_i64();
        let probe = match buf.get_u8() {
            0 => false,
            1 => true,
            other => bail!("invalid probe flag {}", other),
        };

        Ok(Packet {
            seq,
            send_time: Timestamp { seconds, micros },
            probe,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_header_len() {
        assert_eq!(Packet::HEADER_LEN, 21);
    }

    #[rstest]
    #[case::header_only(21)]
    #[case::datagram(DEFAULT_DATAGRAM_PACKET_SIZE)]
    #[case::stream(DEFAULT_STREAM_PACKET_SIZE)]
    fn test_ser_padding(#[case] packet_size: usize) {
        let packet = Packet {
            seq: 7,
            send_time: Timestamp { seconds: 1, micros: 2 },
            probe: true,
        };

        let mut buf = BytesMut::new();
        packet.ser(&mut buf, packet_size);
        assert_eq!(buf.len(), packet_size);
        assert!(buf[Packet::HEADER_LEN..].iter().all(|&b| b == 0));

        let mut b: &[u8] = &buf;
        assert_eq!(Packet::deser(&mut b).unwrap(), packet);
        assert_eq!(b.len(), packet_size - Packet::HEADER_LEN);
    }

    #[test]
    fn test_ser_layout() {
        let packet = Packet {
            seq: 0x01020304,
            send_time: Timestamp { seconds: 5, micros: 6 },
            probe: false,
        };

        let mut buf = BytesMut::new();
        packet.ser(&mut buf, Packet::HEADER_LEN);
        assert_eq!(buf.as_ref(), &[1,2,3,4, 0,0,0,0,0,0,0,5, 0,0,0,0,0,0,0,6, 0]);
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::truncated(vec![0,0,0,1, 0,0,0,0,0,0,0,5, 0,0,0,0,0,0,0])]
    #[case::bad_probe_flag(vec![0,0,0,1, 0,0,0,0,0,0,0,5, 0,0,0,0,0,0,0,6, 2])]
    fn test_deser_invalid(#[case] raw: Vec<u8>) {
        let mut b: &[u8] = &raw;
        assert!(Packet::deser(&mut b).is_err());
    }
}
