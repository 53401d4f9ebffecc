use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::network::topic;

use super::session::Session;

/// 订阅信息
/// map[topic-filter]Subscription
pub(crate) struct Subscription {
    /// 订阅了这个 filter 的客户端，按订阅顺序排列
    clients: Vec<Arc<Session>>,
    /// 是否为共享订阅
    shared: bool,
    /// 共享订阅下一次投递的位置
    publish_index: usize,
}

impl Subscription {
    fn new(filter: &str) -> Self {
        Self {
            clients: Vec::new(),
            shared: topic::is_shared(filter),
            publish_index: 0,
        }
    }

    /// 共享订阅轮询选出一个客户端，普通订阅全部投递
    fn targets(&mut self, targets: &mut Vec<Arc<Session>>) {
        if !self.shared {
            targets.extend(self.clients.iter().cloned());
            return;
        }

        let index = self.publish_index % self.clients.len();
        targets.push(self.clients[index].clone());
        self.publish_index = (index + 1) % self.clients.len();
    }

    /// 删除客户端，返回是否删除成功
    /// 被删除的正好是下一次投递的客户端时，后一个客户端顶上来，保持轮询顺序
    fn remove(&mut self, session: &Arc<Session>) -> bool {
        let index = match self.clients.iter().position(|c| Arc::ptr_eq(c, session)) {
            Some(index) => index,
            None => return false,
        };

        self.clients.remove(index);
        if index < self.publish_index {
            self.publish_index -= 1;
        }
        if self.publish_index >= self.clients.len() {
            self.publish_index = 0;
        }
        true
    }
}

/// 全局订阅表，所有操作都在同一把锁下进行
pub(crate) struct SubscriptionRegistry {
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// 把客户端加到 filter 的订阅列表中，不存在时新建
    pub(crate) async fn subscribe(&self, filter: &str, session: Arc<Session>) {
        let mut subscriptions = self.subscriptions.lock().await;
        let subscription = subscriptions
            .entry(filter.to_owned())
            .or_insert_with(|| Subscription::new(filter));
        if !subscription.clients.iter().any(|c| Arc::ptr_eq(c, &session)) {
            subscription.clients.push(session);
        }
    }

    /// 把客户端从 filter 的订阅列表中删除，列表为空时删除整个 filter
    pub(crate) async fn unsubscribe(&self, filter: &str, session: &Arc<Session>) -> bool {
        let mut subscriptions = self.subscriptions.lock().await;
        let subscription = match subscriptions.get_mut(filter) {
            Some(subscription) => subscription,
            None => return false,
        };

        let removed = subscription.remove(session);
        if subscription.clients.is_empty() {
            subscriptions.remove(filter);
        }
        removed
    }

    /// 找出 topic 的所有投递目标
    /// 只在锁内做匹配和挑选，真正的发送由调用方在锁外进行
    pub(crate) async fn select_targets(&self, topic_name: &str) -> Vec<Arc<Session>> {
        let mut subscriptions = self.subscriptions.lock().await;
        let mut targets = Vec::new();
        for (filter, subscription) in subscriptions.iter_mut() {
            if topic::matches(filter, topic_name) {
                subscription.targets(&mut targets);
            }
        }
        targets
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.subscriptions.lock().await.is_empty()
    }
}
