use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, Cause, Error, FixedHeader, Kind, PacketType, QoS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    /// QoS > 0 时才有
    pub packet_id: u16,
    /// 原样保存的属性字节，不逐个解析
    pub properties: Bytes,
    pub payload: Bytes,
}

impl Publish {
    pub fn new(topic: impl Into<String>, qos: QoS, retain: bool, payload: Bytes) -> Self {
        Self {
            dup: false,
            qos,
            retain,
            topic: topic.into(),
            packet_id: 0,
            properties: Bytes::new(),
            payload,
        }
    }

    /// 固定头的 flags: dup(bit 3) | qos(bit 2-1) | retain(bit 0)
    pub(crate) fn flags(&self) -> u8 {
        ((self.dup as u8) << 3) | ((self.qos as u8) << 1) | (self.retain as u8)
    }

    pub fn read(fixed_header: FixedHeader, mut stream: Bytes) -> Result<Self, Error> {
        let flags = fixed_header.flags();
        let qos = QoS::try_from((flags & 0b0110) >> 1)
            .map_err(|cause| Error::Decode(Kind::Packet(PacketType::Publish), cause))?;

        let topic = packet::read_string(&mut stream)?;
        let packet_id = match qos {
            QoS::AtMostOnce => 0,
            _ => packet::read_u16(&mut stream)?,
        };
        let properties = super::read_properties(&mut stream)?;

        Ok(Self {
            dup: (flags & 0b1000) != 0,
            qos,
            retain: (flags & 0b0001) != 0,
            topic,
            packet_id,
            properties,
            // 剩下的全是负载
            payload: stream,
        })
    }

    /// 剩余长度
    fn len(&self) -> usize {
        let mut len = 2 + self.topic.len();
        if self.qos != QoS::AtMostOnce {
            len += 2;
        }
        len += packet::variable_int_len(self.properties.len()) + self.properties.len();
        len + self.payload.len()
    }

    pub fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        if self.qos != QoS::AtMostOnce && self.packet_id == 0 {
            return Err(Error::Encode(
                Kind::Packet(PacketType::Publish),
                Cause::PacketIdRequired,
            ));
        }

        let len = self.len();
        let count = FixedHeader::write(stream, PacketType::Publish, self.flags(), len)?;
        packet::write_string(stream, &self.topic)?;
        if self.qos != QoS::AtMostOnce {
            stream.put_u16(self.packet_id);
        }
        packet::write_variable_int(stream, self.properties.len())?;
        stream.extend_from_slice(&self.properties);
        stream.extend_from_slice(&self.payload);

        Ok(count + len)
    }
}

#[cfg(test)]
mod tests {
    use crate::network::packet::v5::Packet;

    use super::*;

    #[test]
    fn qos1_publish_with_properties() {
        let mut stream = BytesMut::from(
            &[
                0b0011_1011, // publish, dup, qos 1, retain
                15,
                0x00,
                0x03,
                b'a',
                b'/',
                b'b', // topic
                0x00,
                0x0A, // packet id = 10
                0x02,
                0x01,
                0x01, // payload format indicator = 1
                b'h',
                b'e',
                b'l',
                b'l',
                b'o',
            ][..],
        );

        let publish = match Packet::read(&mut stream).unwrap() {
            Packet::Publish(publish) => publish,
            packet => panic!("unexpected packet {:?}", packet),
        };
        assert!(publish.dup);
        assert!(publish.retain);
        assert_eq!(publish.qos, QoS::AtLeastOnce);
        assert_eq!(publish.topic, "a/b");
        assert_eq!(publish.packet_id, 10);
        assert_eq!(&publish.properties[..], &[0x01, 0x01]);
        assert_eq!(&publish.payload[..], b"hello");
        assert!(stream.is_empty());
    }

    #[test]
    fn qos0_publish_has_no_packet_id() {
        let publish = Publish::new("sensors/room1/temp", QoS::AtMostOnce, false, "21.5".into());
        let mut stream = BytesMut::new();
        let count = publish.write(&mut stream).unwrap();
        assert_eq!(count, stream.len());
        assert_eq!(stream[0], 0x30);
        // topic(2 + 18) + properties len(1) + payload(4)
        assert_eq!(stream[1] as usize, 25);

        match Packet::read(&mut stream).unwrap() {
            Packet::Publish(decoded) => assert_eq!(decoded, publish),
            packet => panic!("unexpected packet {:?}", packet),
        }
    }

    #[test]
    fn qos3_is_rejected() {
        let mut stream = BytesMut::from(&[0b0011_0110, 0x04, 0x00, 0x01, b't', 0x00][..]);
        assert!(matches!(
            Packet::read(&mut stream),
            Err(Error::Decode(
                Kind::Packet(PacketType::Publish),
                Cause::InvalidQoS(3)
            ))
        ));
    }
}
