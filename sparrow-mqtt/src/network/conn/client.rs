use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    select,
    sync::mpsc::Receiver,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::network::packet::{
    self,
    v5::{Connect, Packet},
    Cause, FixedHeader, Kind,
};

use super::Error;

/// 连接的读半部分
/// 以 packet 为单位从字节流读取数据
pub(crate) struct ClientReader<R> {
    /// tcp 连接，websocket 适配后的字节流，或者测试用的内存管道
    stream: R,
    /// 读缓冲区
    /// 使用缓冲区而非按照字节 从 socket 读取数据
    read: BytesMut,
    /// 允许的最大报文长度，固定头给出的长度超过时不再继续读取
    max_packet_size: usize,
}

impl<R: AsyncRead + Unpin> ClientReader<R> {
    pub(crate) fn new(stream: R, max_packet_size: usize) -> Self {
        Self {
            stream,
            read: BytesMut::with_capacity(4096),
            max_packet_size,
        }
    }

    /// 读取一个 packet
    async fn next_packet(&mut self) -> Result<Packet, Error> {
        loop {
            if let Ok(header) = FixedHeader::read_from(&self.read[..]) {
                let packet_len = header.packet_len();
                if packet_len > self.max_packet_size {
                    return Err(Error::Packet(packet::Error::Decode(
                        Kind::FixedHeader,
                        Cause::PacketTooLarge(packet_len, self.max_packet_size),
                    )));
                }
            }

            let required = match Packet::read(&mut self.read) {
                Ok(packet) => return Ok(packet),
                Err(packet::Error::InsufficientBytes(n)) => n,
                Err(e) => return Err(Error::Packet(e)),
            };

            // 数据不足，读取更多数据
            self.read_bytes(required).await?;
        }
    }

    /// 在 keepalive 时间内读取一个完整的 packet，超时直接返回错误
    /// timeout 为 None 时不设置读超时
    pub(crate) async fn read_packet(
        &mut self,
        timeout: Option<time::Duration>,
    ) -> Result<Packet, Error> {
        match timeout {
            Some(timeout) => time::timeout(timeout, self.next_packet()).await?,
            None => self.next_packet().await,
        }
    }

    /// 第一个报文，必须在给定时间内到达，且必须是 connect 报文
    pub(crate) async fn read_connect(&mut self, timeout: time::Duration) -> Result<Connect, Error> {
        let packet = time::timeout(timeout, self.next_packet())
            .await
            .map_err(|_| Error::ConnectTimeout)??;

        match packet {
            Packet::Connect(connect) => Ok(connect),
            packet => {
                debug!("first packet is {:?}", packet.packet_type());
                Err(Error::FirstPacketNotConnect)
            }
        }
    }

    /// 等待从 socket 读出至少所需长度的数据，放入缓冲区
    /// 如果读不到指定长度的数据，返回错误
    async fn read_bytes(&mut self, required: usize) -> Result<(), Error> {
        let mut total_read = 0;
        loop {
            let read = self.stream.read_buf(&mut self.read).await?;
            if 0 == read {
                // 缓冲区为空说明对端在报文边界处正常关闭
                return if self.read.is_empty() {
                    Err(Error::ConnectionAborted)
                } else {
                    Err(Error::ConnectionReset)
                };
            }

            total_read += read;
            if total_read >= required {
                return Ok(());
            }
        }
    }
}

/// 连接的写半部分
/// 每个客户端只有一个写者，所有发给客户端的帧都经过发送队列，保证字节不会交错
pub(crate) struct ClientWriter<W> {
    stream: W,
}

impl<W: AsyncWrite + Unpin> ClientWriter<W> {
    pub(crate) fn new(stream: W) -> Self {
        Self { stream }
    }

    /// 直接写一个帧，只用于写循环开启之前（拒绝连接的 CONNACK）
    pub(crate) async fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// 写循环：从发送队列取出帧，原样写入连接
    /// 会话生命周期结束（token 取消）或者发送队列关闭时退出
    pub(crate) async fn start(mut self, mut conn_rx: Receiver<Bytes>, token: CancellationToken) {
        loop {
            select! {
                _ = token.cancelled() => break,
                frame = conn_rx.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = self.write_frame(&frame).await {
                            warn!("write to client connection error: {}", e);
                            break;
                        }
                    }
                    None => break,
                }
            }
        }

        // 关闭写半部分，对端能读到 EOF
        let _ = self.stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{io, sync::mpsc};

    use super::*;

    #[tokio::test]
    async fn reads_packets_split_across_writes() {
        let (mut client, server) = io::duplex(64);
        let mut reader = ClientReader::new(server, 1024);

        client.write_all(&[0xC0]).await.unwrap();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            client.write_all(&[0x00, 0xE0, 0x00]).await.unwrap();
        });

        assert!(matches!(reader.read_packet(None).await, Ok(Packet::PingReq)));
        assert!(matches!(
            reader.read_packet(None).await,
            Ok(Packet::Disconnect(_))
        ));

        // 对端关闭
        handle.await.unwrap();
        assert!(matches!(
            reader.read_packet(None).await,
            Err(Error::ConnectionAborted)
        ));
    }

    #[tokio::test]
    async fn eof_mid_packet_is_reset() {
        let (mut client, server) = io::duplex(64);
        let mut reader = ClientReader::new(server, 1024);
        client.write_all(&[0x30, 0x0A, 0x00]).await.unwrap();
        drop(client);

        assert!(matches!(
            reader.read_packet(None).await,
            Err(Error::ConnectionReset)
        ));
    }

    #[tokio::test]
    async fn first_packet_must_be_connect() {
        let (mut client, server) = io::duplex(64);
        let mut reader = ClientReader::new(server, 1024);
        client.write_all(&[0xC0, 0x00]).await.unwrap();

        assert!(matches!(
            reader.read_connect(Duration::from_secs(5)).await,
            Err(Error::FirstPacketNotConnect)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_deadline() {
        let (_client, server) = io::duplex(64);
        let mut reader = ClientReader::new(server, 1024);

        assert!(matches!(
            reader.read_connect(Duration::from_secs(5)).await,
            Err(Error::ConnectTimeout)
        ));
    }

    #[tokio::test]
    async fn oversized_packet_is_rejected() {
        let (mut client, server) = io::duplex(64);
        let mut reader = ClientReader::new(server, 16);

        // 剩余长度 268435455，只发送固定头
        client.write_all(&[0x30, 0xFF, 0xFF, 0xFF, 0x7F]).await.unwrap();
        assert!(matches!(
            reader.read_packet(None).await,
            Err(Error::Packet(packet::Error::Decode(
                Kind::FixedHeader,
                Cause::PacketTooLarge(268_435_460, 16)
            )))
        ));

        // 恰好等于上限的报文可以读取
        let (mut client, server) = io::duplex(64);
        let mut reader = ClientReader::new(server, 2);
        client.write_all(&[0xC0, 0x00]).await.unwrap();
        assert!(matches!(reader.read_packet(None).await, Ok(Packet::PingReq)));
    }

    #[tokio::test]
    async fn writer_drains_queue_in_order() {
        let (mut client, server) = io::duplex(64);
        let (tx, rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let writer = tokio::spawn(ClientWriter::new(server).start(rx, token.clone()));

        tx.send(Bytes::from_static(&[0xD0, 0x00])).await.unwrap();
        tx.send(Bytes::from_static(&[0x40, 0x02, 0x00, 0x01]))
            .await
            .unwrap();

        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0xD0, 0x00, 0x40, 0x02, 0x00, 0x01]);

        token.cancel();
        writer.await.unwrap();
        // 写循环退出后，对端读到 EOF
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }
}
