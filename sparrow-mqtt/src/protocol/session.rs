use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use bytes::Bytes;
use log::{debug, info, warn};
use tokio::{
    sync::{mpsc::Sender, Mutex, Semaphore},
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::network::packet::v5::LastWill;

use super::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Client {0} already connected")]
    AlreadyConnected(String),
}

/// 会话当前挂载的网络连接
pub(crate) struct Link {
    /// 连接的唯一编号，防止旧连接的断开流程影响到新连接
    pub(crate) id: ConnectionId,
    /// 发送队列，由连接的写循环消费
    pub(crate) conn_tx: Sender<Bytes>,
    /// 写循环的生命周期
    pub(crate) token: CancellationToken,
}

/// 卸载连接时取出的状态
pub(crate) struct Detached {
    /// 写循环的生命周期，由调用方在清理完成后取消
    pub(crate) token: CancellationToken,
    pub(crate) subscriptions: Vec<String>,
    pub(crate) last_will: Option<LastWill>,
}

struct Inner {
    link: Option<Link>,
    /// 订阅的 filter，按订阅顺序排列，不重复
    subscriptions: Vec<String>,
    last_will: Option<LastWill>,
    /// 延迟发送遗嘱的定时任务，客户端重连或者会话过期时取消
    will_timer: Option<JoinHandle<()>>,
    /// 会话已经从注册表中移除
    expired: bool,
}

/// 代表服务端的一次会话
/// 会话的生命周期不能小于一次客户端连接
/// 客户端断开后会话保留，同一个 client_id 重连时挂载新的连接
pub(crate) struct Session {
    client_id: String,
    inner: Mutex<Inner>,
    /// 发给这个客户端的投递任务数上限
    deliveries: Arc<Semaphore>,
}

impl Session {
    fn new(client_id: &str, fanout_limit: usize) -> Self {
        Self {
            client_id: client_id.into(),
            inner: Mutex::new(Inner {
                link: None,
                subscriptions: Vec::new(),
                last_will: None,
                will_timer: None,
                expired: false,
            }),
            deliveries: Arc::new(Semaphore::new(fanout_limit.max(1))),
        }
    }

    pub(crate) fn client_id(&self) -> &str {
        &self.client_id
    }

    /// 挂载新连接，取消还没有触发的遗嘱
    async fn attach(&self, link: Link, last_will: Option<LastWill>) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        if inner.link.is_some() {
            return Err(Error::AlreadyConnected(self.client_id.clone()));
        }

        if let Some(timer) = inner.will_timer.take() {
            debug!("client {} reconnected, cancel delayed will", self.client_id);
            timer.abort();
        }
        inner.link = Some(link);
        inner.last_will = last_will;
        Ok(())
    }

    /// 卸载连接，返回连接持有的订阅和遗嘱
    /// 连接已经被替换时返回 None
    pub(crate) async fn detach(&self, id: ConnectionId) -> Option<Detached> {
        let mut inner = self.inner.lock().await;
        match &inner.link {
            Some(link) if link.id == id => {}
            _ => return None,
        }

        let link = inner.link.take()?;
        Some(Detached {
            token: link.token,
            subscriptions: std::mem::take(&mut inner.subscriptions),
            last_will: inner.last_will.take(),
        })
    }

    /// 放入发送队列，队列满时等待
    /// 没有连接时直接丢弃
    pub(crate) async fn send(&self, frame: Bytes) {
        let conn_tx = {
            let inner = self.inner.lock().await;
            inner.link.as_ref().map(|link| link.conn_tx.clone())
        };

        match conn_tx {
            Some(conn_tx) => {
                if conn_tx.send(frame).await.is_err() {
                    debug!("client {} writer closed, frame dropped", self.client_id);
                }
            }
            None => debug!("client {} offline, frame dropped", self.client_id),
        }
    }

    /// 在单独的任务中投递一个帧，调用方不会等待
    /// 这个客户端进行中的投递已达上限时丢弃，返回 false
    pub(crate) fn deliver(self: &Arc<Self>, frame: Bytes) -> bool {
        let permit = match self.deliveries.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("client {} too many in-flight deliveries, frame dropped", self.client_id);
                return false;
            }
        };

        let session = self.clone();
        tokio::spawn(async move {
            session.send(frame).await;
            drop(permit);
        });
        true
    }

    /// 记录订阅，已经订阅过返回 false
    pub(crate) async fn add_subscription(&self, filter: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.subscriptions.iter().any(|f| f == filter) {
            return false;
        }
        inner.subscriptions.push(filter.into());
        true
    }

    /// 删除订阅，没有订阅过返回 false
    pub(crate) async fn remove_subscription(&self, filter: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.subscriptions.iter().position(|f| f == filter) {
            Some(index) => {
                inner.subscriptions.remove(index);
                true
            }
            None => false,
        }
    }

    /// 客户端正常断开，不发送遗嘱
    pub(crate) async fn clear_will(&self) {
        self.inner.lock().await.last_will = None;
    }

    /// 保存遗嘱定时任务，如果客户端已经重连或者会话已过期，直接取消
    pub(crate) async fn set_will_timer(&self, timer: JoinHandle<()>) {
        let mut inner = self.inner.lock().await;
        if inner.link.is_some() || inner.expired {
            timer.abort();
            return;
        }
        inner.will_timer = Some(timer);
    }

    /// 会话过期，取消还没有触发的遗嘱
    async fn expire(&self) {
        let mut inner = self.inner.lock().await;
        inner.expired = true;
        if let Some(timer) = inner.will_timer.take() {
            debug!("session {} expired, cancel delayed will", self.client_id);
            timer.abort();
        }
    }

    #[cfg(test)]
    pub(crate) async fn is_online(&self) -> bool {
        self.inner.lock().await.link.is_some()
    }
}

/// 所有的会话，key = client_id
/// 将需要清理的 session 放到一个队列中，队列顺序即代表需要清理的顺序
/// 当有新的连接进来时，取出队列头的 session 进行判断清理直到过期时间不满足清理条件
pub(crate) struct SessionRegistry {
    inner: Mutex<Sessions>,
    /// 离线会话的过期时间，None 表示永不清理
    expire_interval: Option<time::Duration>,
    /// 每个会话的投递任务上限
    fanout_limit: usize,
}

struct Sessions {
    sessions: HashMap<String, Arc<Session>>,
    /// 已经失效的 session，等待超时移除 (client_id, offline_at)
    ineffective_sessions: VecDeque<(String, Instant)>,
}

impl SessionRegistry {
    pub(crate) fn new(expire_interval: Option<time::Duration>, fanout_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Sessions {
                sessions: HashMap::new(),
                ineffective_sessions: VecDeque::new(),
            }),
            expire_interval,
            fanout_limit,
        }
    }

    /// 为客户端找到或新建会话，挂载新连接
    pub(crate) async fn connect(
        &self,
        client_id: &str,
        link: Link,
        last_will: Option<LastWill>,
    ) -> Result<Arc<Session>, Error> {
        let mut inner = self.inner.lock().await;

        // 清理一波旧的 session
        if let Some(expire_interval) = self.expire_interval {
            inner.evict(Instant::now(), expire_interval).await;
        }

        let fanout_limit = self.fanout_limit;
        let session = inner
            .sessions
            .entry(client_id.to_owned())
            .or_insert_with(|| Arc::new(Session::new(client_id, fanout_limit)))
            .clone();
        session.attach(link, last_will).await?;

        // 从待清理队列中移除当前会话
        inner.ineffective_sessions.retain(|(c, _)| c != client_id);
        Ok(session)
    }

    /// 会话离线，进入待清理队列
    pub(crate) async fn disconnect(&self, client_id: &str) {
        if self.expire_interval.is_none() {
            return;
        }
        let mut inner = self.inner.lock().await;
        inner.ineffective_sessions.retain(|(c, _)| c != client_id);
        inner
            .ineffective_sessions
            .push_back((client_id.to_owned(), Instant::now()));
    }

    #[cfg(test)]
    pub(crate) async fn get(&self, client_id: &str) -> Option<Arc<Session>> {
        self.inner.lock().await.sessions.get(client_id).cloned()
    }
}

impl Sessions {
    async fn evict(&mut self, now: Instant, expire_interval: time::Duration) {
        while let Some((client_id, offline_at)) = self.ineffective_sessions.pop_front() {
            // 没到超时时间，退出
            if now.duration_since(offline_at) < expire_interval {
                self.ineffective_sessions.push_front((client_id, offline_at));
                break;
            }
            // 超时的，删除
            info!("session {} expired", client_id);
            if let Some(session) = self.sessions.remove(&client_id) {
                session.expire().await;
            }
        }
    }
}
