use bytes::{BufMut, BytesMut};

use crate::network::packet::{self, Error, FixedHeader, PacketType};

#[derive(Debug)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<SubscribeReasonCode>,
}

impl SubAck {
    fn len(&self) -> usize {
        // packet id + 属性长度 0 + 每个过滤器一个原因码
        2 + 1 + self.return_codes.len()
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        let len = self.len();
        let count = FixedHeader::write(stream, PacketType::SubAck, 0, len)?;

        stream.put_u16(self.packet_id);
        packet::write_variable_int(stream, 0)?;
        for code in &self.return_codes {
            stream.put_u8(*code as u8);
        }

        Ok(count + len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscribeReasonCode {
    GrantedQoS0 = 0,
    TopicFilterInvalid = 143,
}
