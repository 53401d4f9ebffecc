use bytes::{Buf, Bytes};

use crate::network::packet::{self, Cause, Error, Kind, PacketType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub filters: Vec<SubscribeFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeFilter {
    pub path: String,
    /// 订阅选项，目前统一授予 QoS0，不做解析
    pub options: u8,
}

impl Subscribe {
    pub fn read(mut stream: Bytes) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;
        // 订阅属性跳过
        super::read_properties(&mut stream)?;

        let mut filters = Vec::new();
        while stream.has_remaining() {
            let path = packet::read_string(&mut stream)?;
            let options = packet::read_u8(&mut stream)?;
            filters.push(SubscribeFilter { path, options });
        }

        if filters.is_empty() {
            return Err(Error::Decode(
                Kind::Packet(PacketType::Subscribe),
                Cause::PayloadRequired,
            ));
        }

        Ok(Self { packet_id, filters })
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use crate::network::packet::v5::Packet;

    use super::*;

    #[test]
    fn subscribe_with_many_filters() {
        let mut stream = BytesMut::from(
            &[
                0x82, 17, // subscribe, remaining len
                0x00, 0x05, // packet id
                0x00, // no properties
                0x00, 0x03, b'a', b'/', b'+', 0x01, // a/+ options 1
                0x00, 0x05, b'$', b's', b'y', b's', b'/', 0x00, // $sys/ options 0
            ][..],
        );
        let subscribe = match Packet::read(&mut stream).unwrap() {
            Packet::Subscribe(subscribe) => subscribe,
            packet => panic!("unexpected packet {:?}", packet),
        };
        assert_eq!(subscribe.packet_id, 5);
        assert_eq!(
            subscribe.filters,
            vec![
                SubscribeFilter {
                    path: "a/+".into(),
                    options: 1
                },
                SubscribeFilter {
                    path: "$sys/".into(),
                    options: 0
                }
            ]
        );
    }

    #[test]
    fn subscribe_without_filters_is_rejected() {
        let mut stream = BytesMut::from(&[0x82, 0x03, 0x00, 0x05, 0x00][..]);
        assert!(matches!(
            Packet::read(&mut stream),
            Err(Error::Decode(_, Cause::PayloadRequired))
        ));
    }

    #[test]
    fn subscribe_requires_reserved_flags() {
        let mut stream = BytesMut::from(&[0x80, 0x03, 0x00, 0x05, 0x00][..]);
        assert!(matches!(
            Packet::read(&mut stream),
            Err(Error::Decode(
                Kind::Packet(PacketType::Subscribe),
                Cause::InvalidFlags(0)
            ))
        ));
    }
}
