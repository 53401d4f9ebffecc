use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::warn;

use crate::network::packet::{self, Cause, Error, Kind, PacketType, QoS};

use super::PropertyType;

/// 只支持 v5 协议
const PROTOCOL_LEVEL: u8 = 5;

#[derive(Debug, PartialEq, Eq)]
pub struct Connect {
    /// keepalive 时长（秒）
    pub keepalive: u16,
    /// 客户端id
    pub client_id: String,
    /// 是否清除会话
    pub clean_start: bool,
    /// 遗嘱消息
    pub last_will: Option<LastWill>,
    /// 登录凭证
    pub login: Option<Login>,
}

impl Connect {
    pub fn read(mut stream: Bytes) -> Result<Self, Error> {
        // 可变报头
        let protocol_name = packet::read_string(&mut stream)?;
        if protocol_name != "MQTT" {
            return Err(Error::Decode(
                Kind::Packet(PacketType::Connect),
                Cause::ProtocolName(protocol_name),
            ));
        }
        let protocol_level = packet::read_u8(&mut stream)?;
        if protocol_level != PROTOCOL_LEVEL {
            return Err(Error::Decode(
                Kind::Packet(PacketType::Connect),
                Cause::ProtocolLevel(protocol_level),
            ));
        }

        let connect_flags = packet::read_u8(&mut stream)?;
        let clean_start = (connect_flags & 0b10) != 0;
        let keepalive = packet::read_u16(&mut stream)?;
        // 连接属性不做解析，整体跳过
        super::read_properties(&mut stream)?;

        // 负载
        let client_id = packet::read_string(&mut stream)?;
        let last_will = LastWill::read(connect_flags, &mut stream)?;
        let login = Login::read(connect_flags, &mut stream)?;

        Ok(Self {
            keepalive,
            client_id,
            clean_start,
            last_will,
            login,
        })
    }
}

/// 遗嘱设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    /// 遗嘱发送的目标主题
    pub topic: String,
    /// 遗嘱消息
    pub message: Bytes,
    /// 服务质量
    pub qos: QoS,
    /// 消息保留
    pub retain: bool,
    /// 遗嘱属性
    pub properties: WillProperties,
}

impl LastWill {
    fn read(connect_flags: u8, stream: &mut Bytes) -> Result<Option<LastWill>, Error> {
        let last_will = match connect_flags & 0b100 {
            // 没有遗嘱时，遗嘱 QoS 和保留标志必须为 0
            0 if (connect_flags & 0b0011_1000) != 0 => {
                return Err(Error::Decode(
                    Kind::Packet(PacketType::Connect),
                    Cause::InvalidFlags(connect_flags),
                ));
            }
            0 => None,
            _ => {
                let qos = QoS::try_from((connect_flags & 0b11000) >> 3)
                    .map_err(|cause| Error::Decode(Kind::Packet(PacketType::Connect), cause))?;
                let properties = WillProperties::read(stream)?;
                Some(LastWill {
                    topic: packet::read_string(stream)?,
                    message: packet::read_bytes(stream)?,
                    qos,
                    retain: (connect_flags & 0b0010_0000) != 0,
                    properties,
                })
            }
        };

        Ok(last_will)
    }
}

/// 遗嘱属性
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WillProperties {
    /// 延迟发送时间（秒），0 表示立即发送
    pub delay_interval: u32,
    pub payload_format_indicator: Option<u8>,
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<String>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Bytes>,
    pub user_properties: Vec<(String, String)>,
}

impl WillProperties {
    fn read(stream: &mut Bytes) -> Result<Self, Error> {
        let mut properties = WillProperties::default();

        let mut stream = super::read_properties(stream)?;
        while stream.has_remaining() {
            let prop = packet::read_u8(&mut stream)?;
            match PropertyType::try_from(prop) {
                Ok(PropertyType::WillDelayInterval) => {
                    properties.delay_interval = packet::read_u32(&mut stream)?;
                }
                Ok(PropertyType::PayloadFormatIndicator) => {
                    properties.payload_format_indicator = Some(packet::read_u8(&mut stream)?);
                }
                Ok(PropertyType::MessageExpiryInterval) => {
                    properties.message_expiry_interval = Some(packet::read_u32(&mut stream)?);
                }
                Ok(PropertyType::ContentType) => {
                    properties.content_type = Some(packet::read_string(&mut stream)?);
                }
                Ok(PropertyType::ResponseTopic) => {
                    properties.response_topic = Some(packet::read_string(&mut stream)?);
                }
                Ok(PropertyType::CorrelationData) => {
                    properties.correlation_data = Some(packet::read_bytes(&mut stream)?);
                }
                Ok(PropertyType::UserProperty) => {
                    properties
                        .user_properties
                        .push(packet::read_string_pair(&mut stream)?);
                }
                _ => {
                    // 无法得知该属性的长度，剩下的遗嘱属性全部跳过
                    warn!(
                        "unknown will property identifier {:#04x}, skip {} bytes",
                        prop,
                        stream.remaining()
                    );
                    break;
                }
            }
        }

        Ok(properties)
    }

    /// 转换成遗嘱 publish 报文的属性字节，延迟时间不属于 publish 属性
    pub(crate) fn to_publish_properties(&self) -> Result<Bytes, Error> {
        let mut stream = BytesMut::new();

        if let Some(indicator) = self.payload_format_indicator {
            stream.put_u8(PropertyType::PayloadFormatIndicator as u8);
            packet::write_uint(&mut stream, indicator as u32, 1)?;
        }
        if let Some(interval) = self.message_expiry_interval {
            stream.put_u8(PropertyType::MessageExpiryInterval as u8);
            packet::write_uint(&mut stream, interval, 4)?;
        }
        if let Some(content_type) = &self.content_type {
            stream.put_u8(PropertyType::ContentType as u8);
            packet::write_string(&mut stream, content_type)?;
        }
        if let Some(topic) = &self.response_topic {
            stream.put_u8(PropertyType::ResponseTopic as u8);
            packet::write_string(&mut stream, topic)?;
        }
        if let Some(data) = &self.correlation_data {
            stream.put_u8(PropertyType::CorrelationData as u8);
            packet::write_bytes(&mut stream, data)?;
        }
        for (name, value) in &self.user_properties {
            stream.put_u8(PropertyType::UserProperty as u8);
            packet::write_string_pair(&mut stream, name, value)?;
        }

        Ok(stream.freeze())
    }
}

/// 登录凭证
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    /// 用户名
    pub username: String,
    /// 密码
    pub password: Bytes,
}

impl Login {
    fn read(connect_flags: u8, stream: &mut Bytes) -> Result<Option<Login>, Error> {
        let username = match connect_flags & 0b1000_0000 {
            0 => None,
            _ => Some(packet::read_string(stream)?),
        };

        let password = match connect_flags & 0b0100_0000 {
            0 => None,
            _ => Some(packet::read_bytes(stream)?),
        };

        let login = match (&username, &password) {
            (None, None) => None,
            _ => Some(Login {
                username: username.unwrap_or_default(),
                password: password.unwrap_or_default(),
            }),
        };

        Ok(login)
    }
}
