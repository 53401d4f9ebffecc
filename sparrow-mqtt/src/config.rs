use std::path::Path;

use tokio::fs;

use crate::error::Error;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub broker: Broker,
    #[serde(default)]
    pub session: Session,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Broker {
    /// 客户端连接监听地址
    pub client_addr: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Session {
    /// 离线会话过期时间（秒），不设置则永不清理
    pub expire_interval: Option<u64>,
    /// 等待第一个 CONNECT 报文的时间（秒）
    pub connect_timeout: u64,
    /// keepalive 宽限系数
    pub keep_alive_factor: f64,
    /// 每个客户端发送队列的容量
    pub send_queue_size: usize,
    /// 每个客户端同时进行的投递任务上限，超过时丢弃发给该客户端的消息
    pub fanout_limit: usize,
    /// 允许客户端发送的最大报文字节数（包含固定头）
    pub max_packet_size: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            expire_interval: None,
            connect_timeout: 5,
            keep_alive_factor: 1.5,
            send_queue_size: 100,
            fanout_limit: 128,
            max_packet_size: 1024 * 1024,
        }
    }
}

impl Config {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let s = fs::read_to_string(path).await?;
        s.parse()
    }
}

impl std::str::FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str::<Config>(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_defaults() {
        let cfg: Config = r#"
            [broker]
            client_addr = "127.0.0.1:1883"
        "#
        .parse()
        .unwrap();

        assert_eq!(cfg.broker.client_addr, "127.0.0.1:1883");
        assert_eq!(cfg.session.expire_interval, None);
        assert_eq!(cfg.session.connect_timeout, 5);
        assert_eq!(cfg.session.keep_alive_factor, 1.5);
        assert_eq!(cfg.session.send_queue_size, 100);
        assert_eq!(cfg.session.fanout_limit, 128);
        assert_eq!(cfg.session.max_packet_size, 1024 * 1024);
    }

    #[test]
    fn session_overrides() {
        let cfg: Config = r#"
            [broker]
            client_addr = "0.0.0.0:1883"

            [session]
            expire_interval = 3600
            keep_alive_factor = 1.7
            max_packet_size = 4096
        "#
        .parse()
        .unwrap();

        assert_eq!(cfg.session.expire_interval, Some(3600));
        assert_eq!(cfg.session.keep_alive_factor, 1.7);
        assert_eq!(cfg.session.max_packet_size, 4096);
        assert_eq!(cfg.session.connect_timeout, 5);
    }

    #[test]
    fn missing_broker_section() {
        assert!(matches!("".parse::<Config>(), Err(Error::Config(_))));
    }
}
