//! 一个 mqtt v5 服务端库，用户可以使用此库构建自己的 mqtt broker
//!
//! 支持 QoS0/QoS1 发布，通配符订阅，共享订阅，保留消息，keepalive 和遗嘱

use async_trait::async_trait;

pub use broker::Broker;
pub use config::Config;

pub mod broker;
pub mod config;
pub mod error;
pub mod network;
mod protocol;

/// mqtt事件发生时的回调，由用户实现
#[async_trait]
pub trait Hook: Send + Sync + 'static {
    /// 客户端上线
    async fn connected(&self, client_id: &str);
    /// 客户端连接断开
    async fn disconnect(&self, client_id: &str);
}

pub struct HookNoop;

#[async_trait]
impl Hook for HookNoop {
    async fn connected(&self, _client_id: &str) {}
    async fn disconnect(&self, _client_id: &str) {}
}
