use bytes::{BufMut, BytesMut};

use crate::network::packet::{self, Error, FixedHeader, PacketType};

#[derive(Debug)]
pub struct UnsubAck {
    pub packet_id: u16,
    pub reasons: Vec<UnsubAckReason>,
}

impl UnsubAck {
    fn len(&self) -> usize {
        2 + 1 + self.reasons.len()
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        let len = self.len();
        let count = FixedHeader::write(stream, PacketType::UnsubAck, 0, len)?;

        stream.put_u16(self.packet_id);
        packet::write_variable_int(stream, 0)?;
        for reason in &self.reasons {
            stream.put_u8(*reason as u8);
        }

        Ok(count + len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnsubAckReason {
    Success = 0x00,
    NoSubscriptionExisted = 0x11,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsuback_frame() {
        let mut stream = BytesMut::new();
        let count = UnsubAck {
            packet_id: 9,
            reasons: vec![UnsubAckReason::Success, UnsubAckReason::NoSubscriptionExisted],
        }
        .write(&mut stream)
        .unwrap();
        assert_eq!(count, 7);
        assert_eq!(&stream[..], &[0xB0, 0x05, 0x00, 0x09, 0x00, 0x00, 0x11]);
    }
}
