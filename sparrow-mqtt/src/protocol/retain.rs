use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::network::{packet::v5::Publish, topic};

/// 保留消息，key = topic
pub(crate) struct RetainedStore {
    retains: Mutex<HashMap<String, Publish>>,
}

impl RetainedStore {
    pub(crate) fn new() -> Self {
        Self {
            retains: Mutex::new(HashMap::new()),
        }
    }

    /// 负载为空时删除保留消息，否则直接替换
    pub(crate) async fn put(&self, publish: &Publish) {
        let mut retains = self.retains.lock().await;
        if publish.payload.is_empty() {
            retains.remove(&publish.topic);
        } else {
            retains.insert(publish.topic.clone(), publish.clone());
        }
    }

    /// 先精确查找，找不到再用订阅的 filter 逐个匹配，第一个匹配上的返回
    pub(crate) async fn get(&self, filter: &str) -> Option<Publish> {
        let retains = self.retains.lock().await;
        if let Some(publish) = retains.get(filter) {
            return Some(publish.clone());
        }

        retains
            .iter()
            .find(|(topic_name, _)| topic::matches(filter, topic_name))
            .map(|(_, publish)| publish.clone())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::network::packet::QoS;

    use super::*;

    fn retained(topic: &str, payload: &'static [u8]) -> Publish {
        Publish::new(topic, QoS::AtMostOnce, true, Bytes::from_static(payload))
    }

    #[tokio::test]
    async fn put_replaces_and_empty_payload_clears() {
        let store = RetainedStore::new();
        store.put(&retained("t", b"m1")).await;
        store.put(&retained("t", b"m2")).await;
        assert_eq!(store.get("t").await.unwrap().payload, Bytes::from_static(b"m2"));

        store.put(&retained("t", b"")).await;
        assert!(store.get("t").await.is_none());
    }

    #[tokio::test]
    async fn wildcard_lookup() {
        let store = RetainedStore::new();
        store.put(&retained("sensors/room1/temp", b"21.5")).await;

        let publish = store.get("sensors/+/temp").await.unwrap();
        assert_eq!(publish.topic, "sensors/room1/temp");
        assert!(store.get("sensors/+/humidity").await.is_none());
        assert!(store.get("$share/g/sensors/#").await.is_some());
    }
}
