use bytes::{BufMut, BytesMut};

use crate::network::packet::{self, Error, FixedHeader, PacketType};

use super::PropertyType;

#[derive(Debug)]
pub struct ConnAck {
    pub session_present: bool,
    pub code: ConnectReasonCode,
    pub properties: Option<ConnAckProperties>,
}

impl ConnAck {
    pub fn new(code: ConnectReasonCode) -> Self {
        Self {
            session_present: false,
            code,
            properties: None,
        }
    }

    fn properties_len(&self) -> usize {
        self.properties.as_ref().map_or(0, ConnAckProperties::len)
    }

    fn len(&self) -> usize {
        let properties_len = self.properties_len();
        1 + 1 + packet::variable_int_len(properties_len) + properties_len
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        let len = self.len();
        let count = FixedHeader::write(stream, PacketType::ConnAck, 0, len)?;

        stream.put_u8(self.session_present as u8);
        stream.put_u8(self.code as u8);
        packet::write_variable_int(stream, self.properties_len())?;
        if let Some(properties) = &self.properties {
            properties.write(stream);
        }

        Ok(count + len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReasonCode {
    Success = 0,
    MalformedPacket = 129,
    UnsupportedProtocolVersion = 132,
    ClientIdentifierNotValid = 133,
}

/// broker 通过 CONNACK 告知客户端的能力
#[derive(Debug, Default)]
pub struct ConnAckProperties {
    pub maximum_qos: Option<u8>,
    pub maximum_packet_size: Option<u32>,
    pub shared_subscription_available: Option<u8>,
}

impl ConnAckProperties {
    fn len(&self) -> usize {
        let mut len = 0;
        if self.maximum_qos.is_some() {
            len += 1 + 1;
        }
        if self.maximum_packet_size.is_some() {
            len += 1 + 4;
        }
        if self.shared_subscription_available.is_some() {
            len += 1 + 1;
        }
        len
    }

    fn write(&self, stream: &mut BytesMut) {
        if let Some(qos) = self.maximum_qos {
            stream.put_u8(PropertyType::MaximumQos as u8);
            stream.put_u8(qos);
        }
        if let Some(size) = self.maximum_packet_size {
            stream.put_u8(PropertyType::MaximumPacketSize as u8);
            stream.put_u32(size);
        }
        if let Some(available) = self.shared_subscription_available {
            stream.put_u8(PropertyType::SharedSubscriptionAvailable as u8);
            stream.put_u8(available);
        }
    }
}
