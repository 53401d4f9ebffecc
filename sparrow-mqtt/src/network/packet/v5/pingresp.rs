use bytes::BytesMut;

use crate::network::packet::{Error, FixedHeader, PacketType};

pub struct PingResp;

impl PingResp {
    /// 只有固定头，剩余长度为 0
    pub fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        FixedHeader::write(stream, PacketType::PingResp, 0, 0)
    }
}
