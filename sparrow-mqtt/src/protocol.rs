//! 协议层
//! 处理协议相关的逻辑：会话，订阅，保留消息，遗嘱
//! 不直接读写网络，所有发给客户端的数据都放入会话的发送队列

pub(crate) use router::Router;
pub(crate) use session::Session;

pub(crate) mod router;
mod retain;
pub(crate) mod session;
mod subscription;

/// 每个网络连接的唯一编号
pub(crate) type ConnectionId = u64;
