//! v5 协议版本报文

use bytes::{Buf, Bytes, BytesMut};

pub use connack::*;
pub use connect::*;
pub use disconnect::*;
pub use pingresp::*;
pub use puback::*;
pub use publish::*;
pub use suback::*;
pub use subscribe::*;
pub use unsuback::*;
pub use unsubscribe::*;

use super::{Cause, Error, FixedHeader, Kind, PacketType};

pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod pingresp;
pub mod puback;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

/// 属性标识符
#[allow(dead_code)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropertyType {
    PayloadFormatIndicator = 1,
    MessageExpiryInterval = 2,
    ContentType = 3,
    ResponseTopic = 8,
    CorrelationData = 9,
    SubscriptionIdentifier = 11,
    SessionExpiryInterval = 17,
    AssignedClientIdentifier = 18,
    ServerKeepAlive = 19,
    AuthenticationMethod = 21,
    AuthenticationData = 22,
    RequestProblemInformation = 23,
    WillDelayInterval = 24,
    RequestResponseInformation = 25,
    ResponseInformation = 26,
    ServerReference = 28,
    ReasonString = 31,
    ReceiveMaximum = 33,
    TopicAliasMaximum = 34,
    TopicAlias = 35,
    MaximumQos = 36,
    RetainAvailable = 37,
    UserProperty = 38,
    MaximumPacketSize = 39,
    WildcardSubscriptionAvailable = 40,
    SubscriptionIdentifierAvailable = 41,
    SharedSubscriptionAvailable = 42,
}

impl TryFrom<u8> for PropertyType {
    /// 无法识别的属性标识符
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let property = match value {
            1 => PropertyType::PayloadFormatIndicator,
            2 => PropertyType::MessageExpiryInterval,
            3 => PropertyType::ContentType,
            8 => PropertyType::ResponseTopic,
            9 => PropertyType::CorrelationData,
            11 => PropertyType::SubscriptionIdentifier,
            17 => PropertyType::SessionExpiryInterval,
            18 => PropertyType::AssignedClientIdentifier,
            19 => PropertyType::ServerKeepAlive,
            21 => PropertyType::AuthenticationMethod,
            22 => PropertyType::AuthenticationData,
            23 => PropertyType::RequestProblemInformation,
            24 => PropertyType::WillDelayInterval,
            25 => PropertyType::RequestResponseInformation,
            26 => PropertyType::ResponseInformation,
            28 => PropertyType::ServerReference,
            31 => PropertyType::ReasonString,
            33 => PropertyType::ReceiveMaximum,
            34 => PropertyType::TopicAliasMaximum,
            35 => PropertyType::TopicAlias,
            36 => PropertyType::MaximumQos,
            37 => PropertyType::RetainAvailable,
            38 => PropertyType::UserProperty,
            39 => PropertyType::MaximumPacketSize,
            40 => PropertyType::WildcardSubscriptionAvailable,
            41 => PropertyType::SubscriptionIdentifierAvailable,
            42 => PropertyType::SharedSubscriptionAvailable,
            num => return Err(num),
        };

        Ok(property)
    }
}

/// 取出属性长度指示的全部属性字节，不逐个解析
pub(crate) fn read_properties(stream: &mut Bytes) -> Result<Bytes, Error> {
    let properties_len = super::read_variable_int(stream)?;
    if properties_len > stream.len() {
        return Err(Error::Decode(Kind::VariableByteInteger, Cause::Truncated));
    }
    Ok(stream.split_to(properties_len))
}

/// 报文体内的解码错误统一归到所属报文类型上
fn within(packet_type: PacketType) -> impl Fn(Error) -> Error {
    move |e| match e {
        Error::Decode(_, cause) => Error::Decode(Kind::Packet(packet_type), cause),
        e => e,
    }
}

#[derive(Debug)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect(Disconnect),
}

impl Packet {
    /// 从缓冲区读取一个完整报文
    /// 数据不足时返回 InsufficientBytes，缓冲区不会被消耗
    pub(crate) fn read(stream: &mut BytesMut) -> Result<Self, Error> {
        let fixed_header = FixedHeader::read_from(&stream[..])?;
        let packet_type = fixed_header.packet_type()?;

        let packet_len = fixed_header.packet_len();
        if stream.len() < packet_len {
            return Err(Error::InsufficientBytes(packet_len - stream.len()));
        }

        // 根据固定头给出的长度信息，取出整个报文字节（包含报文头）
        // split_to 方法会更新 stream
        let packet = stream.split_to(packet_len);
        fixed_header.check_flags(packet_type)?;

        // 去掉固定头的报文
        let mut stream = packet.freeze();
        stream.advance(fixed_header.fixed_header_len);

        let packet = match packet_type {
            PacketType::Connect => {
                Packet::Connect(Connect::read(stream).map_err(within(packet_type))?)
            }
            PacketType::Publish => Packet::Publish(
                Publish::read(fixed_header, stream).map_err(within(packet_type))?,
            ),
            PacketType::PubAck => Packet::PubAck(
                PubAck::read(fixed_header, stream).map_err(within(packet_type))?,
            ),
            PacketType::Subscribe => {
                Packet::Subscribe(Subscribe::read(stream).map_err(within(packet_type))?)
            }
            PacketType::Unsubscribe => {
                Packet::Unsubscribe(Unsubscribe::read(stream).map_err(within(packet_type))?)
            }
            PacketType::PingReq => Packet::PingReq,
            PacketType::Disconnect => {
                Packet::Disconnect(Disconnect::read(stream).map_err(within(packet_type))?)
            }
            // 服务端不会收到的报文，QoS2 和 AUTH 流程没有实现
            packet_type => {
                return Err(Error::Decode(
                    Kind::Packet(packet_type),
                    Cause::UnsupportedPacketType,
                ))
            }
        };

        Ok(packet)
    }

    /// 写入缓冲区，返回写入的字节数
    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        match self {
            Packet::ConnAck(ack) => ack.write(stream),
            Packet::Publish(publish) => publish.write(stream),
            Packet::PubAck(puback) => puback.write(stream),
            Packet::SubAck(ack) => ack.write(stream),
            Packet::UnsubAck(ack) => ack.write(stream),
            Packet::PingResp => PingResp.write(stream),
            packet => Err(Error::Encode(
                Kind::Packet(packet.packet_type()),
                Cause::UnsupportedPacketType,
            )),
        }
    }

    /// 编码成一个完整的帧
    pub(crate) fn encode(&self) -> Result<Bytes, Error> {
        let mut stream = BytesMut::new();
        self.write(&mut stream)?;
        Ok(stream.freeze())
    }

    #[inline]
    pub(crate) fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect(_) => PacketType::Disconnect,
        }
    }
}
