//! 报文编解码的基础设施
//!
//! 所有报文共用的二进制格式：固定头，变长整数，定长整数，字符串，二进制数据

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub mod v5;

/// 变长整数能表示的最大值
pub(crate) const VARIABLE_INT_MAX: usize = 268_435_455;
/// 字符串和二进制数据的最大长度
pub(crate) const STRING_MAX_LENGTH: usize = 65_535;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("At least {0} more bytes required")]
    InsufficientBytes(usize),
    #[error("Decode {0} error: {1}")]
    Decode(Kind, Cause),
    #[error("Encode {0} error: {1}")]
    Encode(Kind, Cause),
}

/// 出错的数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    FixedHeader,
    VariableByteInteger,
    UnsignedInt,
    Utf8String,
    BinaryData,
    StringPair,
    Packet(PacketType),
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::FixedHeader => write!(f, "fixed header"),
            Kind::VariableByteInteger => write!(f, "variable byte integer"),
            Kind::UnsignedInt => write!(f, "unsigned int"),
            Kind::Utf8String => write!(f, "utf-8 string"),
            Kind::BinaryData => write!(f, "binary data"),
            Kind::StringPair => write!(f, "string pair"),
            Kind::Packet(packet_type) => write!(f, "{:?} packet", packet_type),
        }
    }
}

/// 出错原因
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Cause {
    #[error("buffer truncated")]
    Truncated,
    #[error("malformed variable byte integer")]
    MalformedLength,
    #[error("found {0:?} but expected \"MQTT\"")]
    ProtocolName(String),
    #[error("unsupported protocol level {0}")]
    ProtocolLevel(u8),
    #[error("unsupported width {0}")]
    UnsupportedWidth(usize),
    #[error("value {0} does not fit in {1} bytes")]
    ValueOverflow(u32, usize),
    #[error("malformed utf-8 string")]
    MalformedString,
    #[error("length {0} exceeds 65535")]
    TooLong(usize),
    #[error("value {0} exceeds 268435455")]
    TooLarge(usize),
    #[error("invalid QoS {0}")]
    InvalidQoS(u8),
    #[error("invalid flags {0:#06b}")]
    InvalidFlags(u8),
    #[error("invalid packet type {0}")]
    InvalidPacketType(u8),
    #[error("packet type not accepted by broker")]
    UnsupportedPacketType,
    #[error("payload required")]
    PayloadRequired,
    #[error("packet identifier required")]
    PacketIdRequired,
    #[error("invalid reason code {0:#04x}")]
    InvalidReasonCode(u8),
    #[error("packet size {0} exceeds maximum {1}")]
    PacketTooLarge(usize, usize),
}

/// 报文类型，固定头第一个字节的高 4 位
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck,
    Publish,
    PubAck,
    PubRec,
    PubRel,
    PubComp,
    Subscribe,
    SubAck,
    Unsubscribe,
    UnsubAck,
    PingReq,
    PingResp,
    Disconnect,
    Auth,
}

impl PacketType {
    /// 固定头中规定的 flags
    /// PUBLISH 的 flags 由 dup/qos/retain 决定，不在这里
    fn reserved_flags(&self) -> u8 {
        match self {
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => 0b0010,
            _ => 0b0000,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let packet_type = match value {
            1 => PacketType::Connect,
            2 => PacketType::ConnAck,
            3 => PacketType::Publish,
            4 => PacketType::PubAck,
            5 => PacketType::PubRec,
            6 => PacketType::PubRel,
            7 => PacketType::PubComp,
            8 => PacketType::Subscribe,
            9 => PacketType::SubAck,
            10 => PacketType::Unsubscribe,
            11 => PacketType::UnsubAck,
            12 => PacketType::PingReq,
            13 => PacketType::PingResp,
            14 => PacketType::Disconnect,
            15 => PacketType::Auth,
            n => return Err(Error::Decode(Kind::FixedHeader, Cause::InvalidPacketType(n))),
        };

        Ok(packet_type)
    }
}

/// 服务质量
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[allow(clippy::enum_variant_names)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = Cause;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            qos => Err(Cause::InvalidQoS(qos)),
        }
    }
}

/// 固定头
#[derive(Debug, Clone, Copy)]
pub struct FixedHeader {
    /// 固定头的第一个字节，包含报文类型和flags
    byte1: u8,
    /// 固定头的大小
    pub(crate) fixed_header_len: usize,
    /// 剩余长度大小
    pub(crate) remaining_len: usize,
}

impl FixedHeader {
    /// 从缓冲区头部解析固定头，不消耗缓冲区
    /// 数据不足时返回 InsufficientBytes
    pub(crate) fn read_from(stream: &[u8]) -> Result<Self, Error> {
        if stream.len() < 2 {
            return Err(Error::InsufficientBytes(2 - stream.len()));
        }

        let (remaining_len, len_len) = decode_variable_int(&stream[1..])?;

        Ok(Self {
            byte1: stream[0],
            fixed_header_len: 1 + len_len,
            remaining_len,
        })
    }

    #[inline]
    pub(crate) fn packet_type(&self) -> Result<PacketType, Error> {
        PacketType::try_from(self.byte1 >> 4)
    }

    #[inline]
    pub(crate) fn flags(&self) -> u8 {
        self.byte1 & 0x0F
    }

    /// 整个完整报文的字节长度
    #[inline]
    pub(crate) fn packet_len(&self) -> usize {
        self.fixed_header_len + self.remaining_len
    }

    /// 校验保留的 flags 位
    pub(crate) fn check_flags(&self, packet_type: PacketType) -> Result<(), Error> {
        if packet_type == PacketType::Publish || self.flags() == packet_type.reserved_flags() {
            return Ok(());
        }
        Err(Error::Decode(
            Kind::Packet(packet_type),
            Cause::InvalidFlags(self.flags()),
        ))
    }

    /// 写入固定头，返回写入的字节数
    pub(crate) fn write(
        stream: &mut BytesMut,
        packet_type: PacketType,
        flags: u8,
        remaining_len: usize,
    ) -> Result<usize, Error> {
        let flags = match packet_type {
            PacketType::Publish => flags & 0x0F,
            _ => packet_type.reserved_flags(),
        };
        stream.put_u8(((packet_type as u8) << 4) | flags);
        let count = write_variable_int(stream, remaining_len)?;
        Ok(1 + count)
    }
}

/// 解码变长整数，返回 (值, 占用的字节数)
///
/// 每个字节低 7 位为数据，最高位为后续标志，低位在前，最多 4 个字节
pub(crate) fn decode_variable_int(stream: &[u8]) -> Result<(usize, usize), Error> {
    if stream.is_empty() {
        return Err(Error::Decode(Kind::VariableByteInteger, Cause::Truncated));
    }

    let mut value: usize = 0;
    let mut shift = 0;
    for (index, byte) in stream.iter().enumerate() {
        // 第 5 个字节
        if index == 4 {
            return Err(Error::Decode(
                Kind::VariableByteInteger,
                Cause::MalformedLength,
            ));
        }
        value += ((byte & 0x7F) as usize) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
        shift += 7;
    }

    if stream.len() >= 4 {
        return Err(Error::Decode(
            Kind::VariableByteInteger,
            Cause::MalformedLength,
        ));
    }
    Err(Error::InsufficientBytes(1))
}

/// 从报文体中读取变长整数，报文已经完整，数据不足即为截断
pub(crate) fn read_variable_int(stream: &mut Bytes) -> Result<usize, Error> {
    let (value, len) = match decode_variable_int(&stream[..]) {
        Ok(v) => v,
        Err(Error::InsufficientBytes(_)) => {
            return Err(Error::Decode(Kind::VariableByteInteger, Cause::Truncated))
        }
        Err(e) => return Err(e),
    };
    stream.advance(len);
    Ok(value)
}

/// 写入变长整数，返回写入的字节数
pub(crate) fn write_variable_int(stream: &mut BytesMut, value: usize) -> Result<usize, Error> {
    if value > VARIABLE_INT_MAX {
        return Err(Error::Encode(
            Kind::VariableByteInteger,
            Cause::TooLarge(value),
        ));
    }

    let mut x = value;
    let mut count = 0;
    loop {
        let mut byte = (x % 128) as u8;
        x /= 128;
        if x > 0 {
            byte |= 128;
        }

        stream.put_u8(byte);
        count += 1;
        if x == 0 {
            return Ok(count);
        }
    }
}

/// 变长整数编码后的字节数
pub(crate) fn variable_int_len(value: usize) -> usize {
    if value >= 2_097_152 {
        4
    } else if value >= 16_384 {
        3
    } else if value >= 128 {
        2
    } else {
        1
    }
}

/// 读取大端序的定长整数，宽度只能是 1，2，4
pub(crate) fn read_uint(stream: &mut Bytes, width: usize) -> Result<u32, Error> {
    if !matches!(width, 1 | 2 | 4) {
        return Err(Error::Decode(
            Kind::UnsignedInt,
            Cause::UnsupportedWidth(width),
        ));
    }
    if stream.len() < width {
        return Err(Error::Decode(Kind::UnsignedInt, Cause::Truncated));
    }

    let value = match width {
        1 => stream.get_u8() as u32,
        2 => stream.get_u16() as u32,
        _ => stream.get_u32(),
    };
    Ok(value)
}

/// 写入大端序的定长整数，宽度只能是 1，2，4
pub(crate) fn write_uint(stream: &mut BytesMut, value: u32, width: usize) -> Result<(), Error> {
    match width {
        1 if value <= u8::MAX as u32 => stream.put_u8(value as u8),
        2 if value <= u16::MAX as u32 => stream.put_u16(value as u16),
        4 => stream.put_u32(value),
        1 | 2 => {
            return Err(Error::Encode(
                Kind::UnsignedInt,
                Cause::ValueOverflow(value, width),
            ))
        }
        _ => {
            return Err(Error::Encode(
                Kind::UnsignedInt,
                Cause::UnsupportedWidth(width),
            ))
        }
    }
    Ok(())
}

pub(crate) fn read_u8(stream: &mut Bytes) -> Result<u8, Error> {
    Ok(read_uint(stream, 1)? as u8)
}

pub(crate) fn read_u16(stream: &mut Bytes) -> Result<u16, Error> {
    Ok(read_uint(stream, 2)? as u16)
}

pub(crate) fn read_u32(stream: &mut Bytes) -> Result<u32, Error> {
    read_uint(stream, 4)
}

/// 读取 2 字节长度前缀的数据
fn read_prefixed(stream: &mut Bytes, kind: Kind) -> Result<Bytes, Error> {
    if stream.len() < 2 {
        return Err(Error::Decode(kind, Cause::Truncated));
    }
    // 后续可取出的字节的长度
    let len = stream.get_u16() as usize;
    if len > stream.len() {
        return Err(Error::Decode(kind, Cause::Truncated));
    }

    Ok(stream.split_to(len))
}

fn write_prefixed(stream: &mut BytesMut, bytes: &[u8], kind: Kind) -> Result<(), Error> {
    if bytes.len() > STRING_MAX_LENGTH {
        return Err(Error::Encode(kind, Cause::TooLong(bytes.len())));
    }
    stream.put_u16(bytes.len() as u16);
    stream.extend_from_slice(bytes);
    Ok(())
}

/// 读取二进制数据
pub(crate) fn read_bytes(stream: &mut Bytes) -> Result<Bytes, Error> {
    read_prefixed(stream, Kind::BinaryData)
}

pub(crate) fn write_bytes(stream: &mut BytesMut, bytes: &[u8]) -> Result<(), Error> {
    write_prefixed(stream, bytes, Kind::BinaryData)
}

/// 读取 utf-8 字符串
pub(crate) fn read_string(stream: &mut Bytes) -> Result<String, Error> {
    let s = read_prefixed(stream, Kind::Utf8String)?;
    String::from_utf8(s.to_vec()).map_err(|_| Error::Decode(Kind::Utf8String, Cause::MalformedString))
}

pub(crate) fn write_string(stream: &mut BytesMut, string: &str) -> Result<(), Error> {
    write_prefixed(stream, string.as_bytes(), Kind::Utf8String)
}

/// 读取字符串对（用户属性）
pub(crate) fn read_string_pair(stream: &mut Bytes) -> Result<(String, String), Error> {
    let read = |stream: &mut Bytes| {
        read_string(stream).map_err(|e| match e {
            Error::Decode(_, cause) => Error::Decode(Kind::StringPair, cause),
            e => e,
        })
    };
    let name = read(stream)?;
    let value = read(stream)?;
    Ok((name, value))
}

pub(crate) fn write_string_pair(stream: &mut BytesMut, name: &str, value: &str) -> Result<(), Error> {
    write_prefixed(stream, name.as_bytes(), Kind::StringPair)?;
    write_prefixed(stream, value.as_bytes(), Kind::StringPair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_int_round_trip() {
        let values = [0, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, 268_435_455];
        for value in values {
            let mut stream = BytesMut::new();
            let written = write_variable_int(&mut stream, value).unwrap();
            assert_eq!(written, variable_int_len(value));

            let (decoded, consumed) = decode_variable_int(&stream).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, written);
        }
    }

    #[test]
    fn variable_int_rejects_fifth_byte() {
        let err = decode_variable_int(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(Kind::VariableByteInteger, Cause::MalformedLength)
        ));

        // 4 个字节都带后续标志，同样不合法
        let err = decode_variable_int(&[0x80, 0x80, 0x80, 0x80]).unwrap_err();
        assert!(matches!(err, Error::Decode(_, Cause::MalformedLength)));
    }

    #[test]
    fn variable_int_rejects_empty_input() {
        assert!(matches!(
            decode_variable_int(&[]),
            Err(Error::Decode(Kind::VariableByteInteger, Cause::Truncated))
        ));
        // 有后续标志但数据不够
        assert!(matches!(
            decode_variable_int(&[0x80]),
            Err(Error::InsufficientBytes(1))
        ));
    }

    #[test]
    fn variable_int_too_large() {
        let mut stream = BytesMut::new();
        assert!(matches!(
            write_variable_int(&mut stream, VARIABLE_INT_MAX + 1),
            Err(Error::Encode(_, Cause::TooLarge(_)))
        ));
    }

    #[test]
    fn unsigned_int_widths() {
        let mut stream = BytesMut::new();
        write_uint(&mut stream, 0xAB, 1).unwrap();
        write_uint(&mut stream, 0xABCD, 2).unwrap();
        write_uint(&mut stream, 0xDEAD_BEEF, 4).unwrap();
        assert_eq!(&stream[..], &[0xAB, 0xAB, 0xCD, 0xDE, 0xAD, 0xBE, 0xEF]);

        let mut bytes = stream.freeze();
        assert_eq!(read_uint(&mut bytes, 1).unwrap(), 0xAB);
        assert_eq!(read_uint(&mut bytes, 2).unwrap(), 0xABCD);
        assert_eq!(read_uint(&mut bytes, 4).unwrap(), 0xDEAD_BEEF);

        let mut bytes = Bytes::from_static(&[0, 0, 0]);
        assert!(matches!(
            read_uint(&mut bytes, 3),
            Err(Error::Decode(Kind::UnsignedInt, Cause::UnsupportedWidth(3)))
        ));
        let mut stream = BytesMut::new();
        assert!(matches!(
            write_uint(&mut stream, 256, 1),
            Err(Error::Encode(_, Cause::ValueOverflow(256, 1)))
        ));
    }

    #[test]
    fn string_framing() {
        let mut stream = BytesMut::new();
        write_string(&mut stream, "a/b").unwrap();
        assert_eq!(&stream[..], &[0x00, 0x03, b'a', b'/', b'b']);
        assert_eq!(read_string(&mut stream.freeze()).unwrap(), "a/b");

        let mut short = Bytes::from_static(&[0x00]);
        assert!(matches!(
            read_string(&mut short),
            Err(Error::Decode(Kind::Utf8String, Cause::Truncated))
        ));

        let long = "x".repeat(STRING_MAX_LENGTH + 1);
        let mut stream = BytesMut::new();
        assert!(matches!(
            write_string(&mut stream, &long),
            Err(Error::Encode(Kind::Utf8String, Cause::TooLong(_)))
        ));
    }

    #[test]
    fn string_pair_framing() {
        let mut stream = BytesMut::new();
        write_string_pair(&mut stream, "k", "v").unwrap();
        let (name, value) = read_string_pair(&mut stream.freeze()).unwrap();
        assert_eq!((name.as_str(), value.as_str()), ("k", "v"));
    }

    #[test]
    fn fixed_header_needs_more_bytes() {
        assert!(matches!(
            FixedHeader::read_from(&[0x30]),
            Err(Error::InsufficientBytes(1))
        ));
        assert!(matches!(
            FixedHeader::read_from(&[0x30, 0x80]),
            Err(Error::InsufficientBytes(1))
        ));

        let header = FixedHeader::read_from(&[0x32, 0x80, 0x01]).unwrap();
        assert_eq!(header.packet_type().unwrap(), PacketType::Publish);
        assert_eq!(header.flags(), 0b0010);
        assert_eq!(header.remaining_len, 128);
        assert_eq!(header.packet_len(), 3 + 128);
    }

    #[test]
    fn fixed_header_reserved_flags() {
        let header = FixedHeader::read_from(&[0x80, 0x00]).unwrap();
        assert!(header.check_flags(PacketType::Subscribe).is_err());
        let header = FixedHeader::read_from(&[0x82, 0x00]).unwrap();
        assert!(header.check_flags(PacketType::Subscribe).is_ok());
    }
}
