use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use tokio::{
    sync::mpsc::Sender,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config,
    network::{
        packet::{
            self,
            v5::{
                LastWill, Packet, PubAck, Publish, SubAck, Subscribe, SubscribeFilter,
                SubscribeReasonCode, UnsubAck, UnsubAckReason, Unsubscribe,
            },
            QoS,
        },
        topic,
    },
};

use super::{
    retain::RetainedStore,
    session::{self, Link, Session, SessionRegistry},
    subscription::SubscriptionRegistry,
    ConnectionId,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Session error: {0}")]
    Session(#[from] session::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] packet::Error),
}

/// 处理 mqtt 协议层运行时相关逻辑
/// 持有会话表，订阅表和保留消息，被所有客户端连接共享
pub(crate) struct Router {
    /// 管理客户端会话，key = client_id
    sessions: SessionRegistry,
    /// 全局订阅信息, key = topic-filter
    pub(crate) subscriptions: SubscriptionRegistry,
    /// 保留消息
    retains: RetainedStore,
    /// 下一个连接编号
    next_conn_id: AtomicU64,
}

impl Router {
    pub(crate) fn new(session_cfg: &config::Session) -> Self {
        Self {
            sessions: SessionRegistry::new(
                session_cfg.expire_interval.map(time::Duration::from_secs),
                session_cfg.fanout_limit,
            ),
            subscriptions: SubscriptionRegistry::new(),
            retains: RetainedStore::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// 处理客户端连接，挂载到会话上
    pub(crate) async fn connect(
        &self,
        client_id: &str,
        last_will: Option<LastWill>,
        conn_tx: Sender<Bytes>,
        token: CancellationToken,
    ) -> Result<(Arc<Session>, ConnectionId), Error> {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let link = Link { id, conn_tx, token };
        let session = self.sessions.connect(client_id, link, last_will).await?;
        Ok((session, id))
    }

    /// 处理客户端发布的消息
    ///
    /// * retain: 保存或清除保留消息
    /// * qos1: 回复 puback，只进入发布者自己的发送队列
    /// * 分发给所有匹配的订阅
    pub(crate) async fn publish(&self, session: &Arc<Session>, publish: Publish) -> Result<(), Error> {
        if publish.retain {
            self.retains.put(&publish).await;
        }

        if publish.qos == QoS::AtLeastOnce {
            let frame = Packet::PubAck(PubAck::new(publish.packet_id)).encode()?;
            session.send(frame).await;
        }

        self.dispatch(&publish).await
    }

    /// 编码一次，投递给所有目标
    /// 每个投递单独一个任务，发布者不等待投递完成
    /// 任务数按目标客户端限制，慢客户端只会丢失发给自己的消息
    async fn dispatch(&self, publish: &Publish) -> Result<(), Error> {
        let mut stream = BytesMut::new();
        publish.write(&mut stream)?;
        let frame = stream.freeze();

        let targets = self.subscriptions.select_targets(&publish.topic).await;
        debug!("dispatch {} to {} client(s)", publish.topic, targets.len());
        for target in targets {
            target.deliver(frame.clone());
        }

        Ok(())
    }

    /// 处理订阅，每个 filter 一个原因码
    pub(crate) async fn subscribe(
        &self,
        session: &Arc<Session>,
        subscribe: Subscribe,
    ) -> Result<SubAck, Error> {
        let mut return_codes = Vec::with_capacity(subscribe.filters.len());
        for SubscribeFilter { path, .. } in subscribe.filters {
            if !topic::valid_subscribe_filter(&path) {
                warn!("client {} subscribe invalid filter {:?}", session.client_id(), path);
                return_codes.push(SubscribeReasonCode::TopicFilterInvalid);
                continue;
            }

            let added = session.add_subscription(&path).await;
            // 共享订阅不发送保留消息
            if !topic::is_shared(&path) {
                if let Some(retained) = self.retains.get(&path).await {
                    session.send(Packet::Publish(retained).encode()?).await;
                }
            }
            if added {
                self.subscriptions.subscribe(&path, session.clone()).await;
            }
            debug!("client {} subscribed {}", session.client_id(), path);
            return_codes.push(SubscribeReasonCode::GrantedQoS0);
        }

        Ok(SubAck {
            packet_id: subscribe.packet_id,
            return_codes,
        })
    }

    /// 处理取消订阅
    pub(crate) async fn unsubscribe(&self, session: &Arc<Session>, unsubscribe: Unsubscribe) -> UnsubAck {
        let mut reasons = Vec::with_capacity(unsubscribe.filters.len());
        for filter in unsubscribe.filters {
            if session.remove_subscription(&filter).await {
                self.subscriptions.unsubscribe(&filter, session).await;
                reasons.push(UnsubAckReason::Success);
            } else {
                reasons.push(UnsubAckReason::NoSubscriptionExisted);
            }
        }

        UnsubAck {
            packet_id: unsubscribe.packet_id,
            reasons,
        }
    }

    /// 连接断开
    /// 取消所有订阅，会话保留，有遗嘱时立即或者延迟发布遗嘱
    pub(crate) async fn disconnect(self: &Arc<Self>, session: &Arc<Session>, conn_id: ConnectionId) {
        let detached = match session.detach(conn_id).await {
            Some(detached) => detached,
            None => return,
        };

        for filter in &detached.subscriptions {
            self.subscriptions.unsubscribe(filter, session).await;
        }
        self.sessions.disconnect(session.client_id()).await;
        // 订阅清理完成后再结束写循环
        detached.token.cancel();

        let will = match detached.last_will {
            Some(will) => will,
            None => return,
        };
        let delay = will.properties.delay_interval;
        if delay == 0 {
            self.publish_will(session.client_id(), will).await;
            return;
        }

        info!("will of client {} delayed {}s", session.client_id(), delay);
        let router = self.clone();
        let client_id = session.client_id().to_owned();
        let timer = tokio::spawn(async move {
            time::sleep(time::Duration::from_secs(delay as u64)).await;
            router.publish_will(&client_id, will).await;
        });
        session.set_will_timer(timer).await;
    }

    /// 发布遗嘱，以 QoS0 投递
    async fn publish_will(&self, client_id: &str, will: LastWill) {
        if !topic::valid_publish_topic(&will.topic) {
            warn!("client {} will topic {:?} invalid", client_id, will.topic);
            return;
        }

        let properties = match will.properties.to_publish_properties() {
            Ok(properties) => properties,
            Err(e) => {
                warn!("client {} will properties error: {}", client_id, e);
                return;
            }
        };
        let publish = Publish {
            properties,
            ..Publish::new(will.topic, QoS::AtMostOnce, will.retain, will.message)
        };

        info!("publish will of client {} to {}", client_id, publish.topic);
        if publish.retain {
            self.retains.put(&publish).await;
        }
        if let Err(e) = self.dispatch(&publish).await {
            warn!("dispatch will of client {} error: {}", client_id, e);
        }
    }
}
