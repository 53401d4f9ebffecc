use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, Cause, Error, FixedHeader, Kind, PacketType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubAck {
    pub packet_id: u16,
    pub reason: PubAckReason,
}

impl PubAck {
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            reason: PubAckReason::Success,
        }
    }

    fn len(&self) -> usize {
        match self.reason {
            PubAckReason::Success => 2,
            // packet id + reason + 属性长度 0
            _ => 2 + 1 + 1,
        }
    }

    pub fn read(fixed_header: FixedHeader, mut stream: Bytes) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;

        // 只有 packet id 时表示成功
        if fixed_header.remaining_len == 2 {
            return Ok(Self::new(packet_id));
        }

        let reason = PubAckReason::try_from(packet::read_u8(&mut stream)?)?;
        if fixed_header.remaining_len > 3 {
            // 属性不关心
            super::read_properties(&mut stream)?;
        }

        Ok(Self { packet_id, reason })
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        let len = self.len();
        let count = FixedHeader::write(stream, PacketType::PubAck, 0, len)?;
        stream.put_u16(self.packet_id);

        if self.reason != PubAckReason::Success {
            stream.put_u8(self.reason as u8);
            packet::write_variable_int(stream, 0)?;
        }

        Ok(count + len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PubAckReason {
    Success = 0,
    NoMatchingSubscribers = 16,
    UnspecifiedError = 128,
    ImplementationSpecificError = 131,
    NotAuthorized = 135,
    TopicNameInvalid = 144,
    PacketIdentifierInUse = 145,
    QuotaExceeded = 151,
    PayloadFormatInvalid = 153,
}

impl TryFrom<u8> for PubAckReason {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0 => PubAckReason::Success,
            16 => PubAckReason::NoMatchingSubscribers,
            128 => PubAckReason::UnspecifiedError,
            131 => PubAckReason::ImplementationSpecificError,
            135 => PubAckReason::NotAuthorized,
            144 => PubAckReason::TopicNameInvalid,
            145 => PubAckReason::PacketIdentifierInUse,
            151 => PubAckReason::QuotaExceeded,
            153 => PubAckReason::PayloadFormatInvalid,
            num => {
                return Err(Error::Decode(
                    Kind::Packet(PacketType::PubAck),
                    Cause::InvalidReasonCode(num),
                ))
            }
        };

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use crate::network::packet::v5::Packet;

    use super::*;

    #[test]
    fn success_puback_is_packet_id_only() {
        let frame = Packet::PubAck(PubAck::new(7)).encode().unwrap();
        assert_eq!(&frame[..], &[0x40, 0x02, 0x00, 0x07]);
    }

    #[test]
    fn puback_with_reason() {
        let mut stream = BytesMut::new();
        let puback = PubAck {
            packet_id: 7,
            reason: PubAckReason::NoMatchingSubscribers,
        };
        puback.write(&mut stream).unwrap();
        assert_eq!(&stream[..], &[0x40, 0x04, 0x00, 0x07, 0x10, 0x00]);

        match Packet::read(&mut stream).unwrap() {
            Packet::PubAck(decoded) => assert_eq!(decoded, puback),
            packet => panic!("unexpected packet {:?}", packet),
        }
    }

    #[test]
    fn puback_reason_without_properties() {
        let mut stream = BytesMut::from(&[0x40, 0x03, 0x00, 0x01, 0x80][..]);
        match Packet::read(&mut stream).unwrap() {
            Packet::PubAck(puback) => assert_eq!(puback.reason, PubAckReason::UnspecifiedError),
            packet => panic!("unexpected packet {:?}", packet),
        }
    }
}
