use anyhow::bail;
use bytes::{Buf, BufMut, BytesMut};
use crate::timestamp::Timestamp;

#[derive(Clone, Debug, PartialEq)]
pub struct Ack {
    pub seq: u32,
    pub bytes_acked: u64,
    pub recv_time: Timestamp,
    /// time between the previous packet's arrival and this one's, as seen by the receiver
    pub inter_arrival_secs: Option<f64>,
}

impl Ack {
    pub const SERIALIZED_LEN: usize = size_of::<u32>() + size_of::<u64>() + 2*size_of::<i64>();
    pub const SERIALIZED_LEN_WITH_IAT: usize = Self::SERIALIZED_LEN + size_of::<f64>();

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u32(self.seq);
        buf.put_u64(self.bytes_acked);
        buf.put_i64(self.recv_time.seconds);
        buf.put_i64(self.recv_time.micros);
        if let Some(iat) = self.inter_arrival_secs {
            buf.put_f64(iat);
        }
    }

    /// Acks are fixed-size records, so the buffer must contain exactly one of the two variants
    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<Ack> {
        let with_iat = match buf.remaining() {
            Self::SERIALIZED_LEN => false,
            Self::SERIALIZED_LEN_WITH_IAT => true,
            n => bail!("ack has unexpected length {}", n),
        };

        let seq = buf.get_u32();
        let bytes_acked = buf.get_u64();
        let seconds = buf.get_i64();
        let micros = buf.get_i64();
        let inter_arrival_secs = if with_iat { Some(buf.get_f64()) } else { None };

        Ok(Ack {
            seq,
            bytes_acked,
            recv_time: Timestamp { seconds, micros },
            inter_arrival_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain(Ack { seq: 1, bytes_acked: 1472, recv_time: Timestamp { seconds: 1700000000, micros: 123 }, inter_arrival_secs: None }, Ack::SERIALIZED_LEN)]
    #[case::with_iat(Ack { seq: u32::MAX, bytes_acked: 0, recv_time: Timestamp { seconds: 3, micros: 999_999 }, inter_arrival_secs: Some(0.25) }, Ack::SERIALIZED_LEN_WITH_IAT)]
    fn test_ser_deser(#[case] ack: Ack, #[case] expected_len: usize) {
        let mut buf = BytesMut::new();
        ack.ser(&mut buf);
        assert_eq!(buf.len(), expected_len);

        let mut b: &[u8] = &buf;
        assert_eq!(Ack::deser(&mut b).unwrap(), ack);
        assert!(b.is_empty());
    }

    #[test]
    fn test_ser_layout() {
        let ack = Ack { seq: 2, bytes_acked: 3, recv_time: Timestamp { seconds: 4, micros: 5 }, inter_arrival_secs: None };
        let mut buf = BytesMut::new();
        ack.ser(&mut buf);
        assert_eq!(buf.as_ref(), &[0,0,0,2, 0,0,0,0,0,0,0,3, 0,0,0,0,0,0,0,4, 0,0,0,0,0,0,0,5]);
    }

    #[rstest]
    #[case::empty(0)]
    #[case::short(27)]
    #[case::between(30)]
    #[case::long(37)]
    fn test_deser_wrong_len(#[case] len: usize) {
        let raw = vec![0u8; len];
        let mut b: &[u8] = &raw;
        assert!(Ack::deser(&mut b).is_err());
    }
}
