//! 网络层
//! 以 packet 为单位读写连接，驱动每个连接的协议状态机

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::{
    io::{self, AsyncRead, AsyncWrite, ReadHalf},
    sync::mpsc,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config,
    protocol::{router, ConnectionId, Router, Session},
    Hook,
};

use self::{
    conn::{ClientReader, ClientWriter},
    packet::{
        v5::{ConnAck, ConnAckProperties, ConnectReasonCode, DisconnectReasonCode, Packet},
        Cause, QoS,
    },
};

pub(crate) mod conn;
pub mod packet;
pub mod topic;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] conn::Error),
    #[error("Router error: {0}")]
    Router(#[from] router::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] packet::Error),
    #[error("Connect refused: {0:?}")]
    ConnectRefused(ConnectReasonCode),
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

/// 一个客户端连接的事件循环
/// 状态：等待 CONNECT（new） -> 已连接（start） -> 关闭
pub(crate) struct ClientEventLoop<S, H: Hook> {
    client_id: String,
    conn_id: ConnectionId,
    session: Arc<Session>,
    reader: ClientReader<ReadHalf<S>>,
    router: Arc<Router>,
    hook: Arc<H>,
    /// 客户端 keepalive 乘以宽限系数，None 表示不检测
    keepalive: Option<time::Duration>,
}

impl<S, H> ClientEventLoop<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: Hook,
{
    /// 读取第一个 CONNECT 报文，挂载会话，开启写循环，回复 CONNACK
    pub(crate) async fn new(
        stream: S,
        router: Arc<Router>,
        hook: Arc<H>,
        session_cfg: &config::Session,
    ) -> Result<Self, Error> {
        let (read, write) = io::split(stream);
        let mut reader = ClientReader::new(read, session_cfg.max_packet_size);
        let mut writer = ClientWriter::new(write);

        // 第一个报文，必须是 connect 报文
        let timeout = time::Duration::from_secs(session_cfg.connect_timeout);
        let connect = match reader.read_connect(timeout).await {
            Ok(connect) => connect,
            Err(conn::Error::Packet(packet::Error::Decode(_, Cause::ProtocolLevel(level)))) => {
                warn!("refuse connection with protocol level {}", level);
                return Err(refuse(&mut writer, ConnectReasonCode::UnsupportedProtocolVersion).await);
            }
            Err(conn::Error::Packet(e)) => {
                warn!("refuse malformed connect packet: {}", e);
                return Err(refuse(&mut writer, ConnectReasonCode::MalformedPacket).await);
            }
            Err(e) => return Err(e.into()),
        };

        let client_id = connect.client_id.clone();
        if client_id.is_empty() {
            warn!("refuse connection with empty client id");
            return Err(refuse(&mut writer, ConnectReasonCode::ClientIdentifierNotValid).await);
        }

        let connack = Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReasonCode::Success,
            properties: Some(ConnAckProperties {
                maximum_qos: Some(QoS::AtLeastOnce as u8),
                maximum_packet_size: u32::try_from(session_cfg.max_packet_size).ok(),
                shared_subscription_available: Some(1),
            }),
        })
        .encode()?;

        // conn_tx 由 session 持有，用于给当前这个 connection 发送消息
        let (conn_tx, conn_rx) = mpsc::channel(session_cfg.send_queue_size.max(1));
        let token = CancellationToken::new();
        let (session, conn_id) = match router
            .connect(&client_id, connect.last_will, conn_tx, token.clone())
            .await
        {
            Ok(attached) => attached,
            Err(router::Error::Session(e)) => {
                warn!("refuse connection: {}", e);
                refuse(&mut writer, ConnectReasonCode::ClientIdentifierNotValid).await;
                return Err(Error::ProtocolViolation(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        tokio::spawn(writer.start(conn_rx, token));
        session.send(connack).await;

        // 0 表示关闭 keepalive 检测
        let keepalive = match connect.keepalive {
            0 => None,
            keepalive => Some(time::Duration::from_secs(
                (keepalive as f64 * session_cfg.keep_alive_factor).round() as u64,
            )),
        };
        info!(
            "client {} connected, clean start {}, username {:?}, keepalive {:?}",
            client_id,
            connect.clean_start,
            connect.login.as_ref().map(|login| login.username.as_str()),
            keepalive
        );
        // 调用回调，连接
        hook.connected(&client_id).await;

        Ok(Self {
            client_id,
            conn_id,
            session,
            reader,
            router,
            hook,
            keepalive,
        })
    }

    pub(crate) fn client_id(&self) -> &str {
        &self.client_id
    }

    /// 开启事件循环，直到连接关闭
    /// 退出时取消所有订阅，处理遗嘱
    pub(crate) async fn start(mut self) -> Result<(), Error> {
        let result = self.run().await;

        self.router.disconnect(&self.session, self.conn_id).await;
        // 调用回调，连接断开
        self.hook.disconnect(&self.client_id).await;
        info!("client {} disconnected", self.client_id);

        match result {
            // 对端在报文边界处关闭连接，正常结束
            Err(Error::Connection(conn::Error::ConnectionAborted)) => Ok(()),
            result => result,
        }
    }

    /// 每成功读到一个报文，重新计算 keepalive 超时
    async fn run(&mut self) -> Result<(), Error> {
        loop {
            let packet = self.reader.read_packet(self.keepalive).await?;
            self.handle_packet(packet).await?;
        }
    }

    /// connect 报文已在 new 方法中处理过，这里如果收到 connect 报文，视为非法连接
    async fn handle_packet(&mut self, packet: Packet) -> Result<(), Error> {
        match packet {
            Packet::Publish(publish) => {
                if publish.qos == QoS::ExactlyOnce {
                    return Err(Error::ProtocolViolation("QoS 2 not supported".into()));
                }
                if !topic::valid_publish_topic(&publish.topic) {
                    return Err(Error::ProtocolViolation(format!(
                        "invalid publish topic {:?}",
                        publish.topic
                    )));
                }
                debug!("client {} publish to {}", self.client_id, publish.topic);
                self.router.publish(&self.session, publish).await?;
            }
            Packet::Subscribe(subscribe) => {
                let suback = self.router.subscribe(&self.session, subscribe).await?;
                self.session.send(Packet::SubAck(suback).encode()?).await;
            }
            Packet::Unsubscribe(unsubscribe) => {
                let unsuback = self.router.unsubscribe(&self.session, unsubscribe).await;
                self.session.send(Packet::UnsubAck(unsuback).encode()?).await;
            }
            Packet::PubAck(puback) => {
                debug!(
                    "client {} puback {} {:?}",
                    self.client_id, puback.packet_id, puback.reason
                );
            }
            Packet::PingReq => self.session.send(Packet::PingResp.encode()?).await,
            Packet::Disconnect(disconnect) => {
                info!(
                    "client {} disconnect with {:?}",
                    self.client_id, disconnect.reason_code
                );
                if disconnect.reason_code == DisconnectReasonCode::NormalDisconnection {
                    self.session.clear_will().await;
                }
            }
            packet => {
                return Err(Error::ProtocolViolation(format!(
                    "unexpected {:?} packet",
                    packet.packet_type()
                )))
            }
        }

        Ok(())
    }
}

/// 写循环开启之前直接回复失败的 CONNACK
async fn refuse<W: AsyncWrite + Unpin>(
    writer: &mut ClientWriter<W>,
    code: ConnectReasonCode,
) -> Error {
    match Packet::ConnAck(ConnAck::new(code)).encode() {
        Ok(frame) => {
            if let Err(e) = writer.write_frame(&frame).await {
                debug!("write refused connack error: {}", e);
            }
            Error::ConnectRefused(code)
        }
        Err(e) => e.into(),
    }
}
