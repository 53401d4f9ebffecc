use bytes::{Buf, Bytes};

use crate::network::packet::{self, Cause, Error, Kind, PacketType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

impl Unsubscribe {
    pub fn read(mut stream: Bytes) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;
        super::read_properties(&mut stream)?;

        let mut filters = Vec::new();
        while stream.has_remaining() {
            filters.push(packet::read_string(&mut stream)?);
        }

        if filters.is_empty() {
            return Err(Error::Decode(
                Kind::Packet(PacketType::Unsubscribe),
                Cause::PayloadRequired,
            ));
        }

        Ok(Self { packet_id, filters })
    }
}
