// 进程内 mesh
//
// 每个主题一条 `broadcast` 总线，所有通过同一 `LocalMesh` 加入该主题的节点
// 共享这条总线。语义与 gossip 网络对齐：没有订阅者时发布照常成功，
// 节点收不到自己发布的消息，慢订阅者以 `Lagged(n)` 的形式感知丢失。

use super::{Message, PeerId, Subscription, Topic, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 每个主题总线的默认容量
pub const DEFAULT_TOPIC_CAPACITY: usize = 256;

struct TopicBus {
    sender: broadcast::Sender<Message>,
    /// 订阅 ID → 订阅方节点
    subscribers: DashMap<u64, PeerId>,
    next_subscription: AtomicU64,
}

impl TopicBus {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscribers: DashMap::new(),
            next_subscription: AtomicU64::new(1),
        }
    }
}

/// 进程内的发布/订阅网络
#[derive(Clone)]
pub struct LocalMesh {
    topics: Arc<DashMap<String, Arc<TopicBus>>>,
    capacity: usize,
}

impl Default for LocalMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalMesh {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// 指定每个主题总线的容量
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// 创建一个新节点（随机 PeerId）
    pub fn node(&self) -> LocalNode {
        LocalNode {
            peer_id: PeerId::random(),
            mesh: self.clone(),
        }
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    fn bus(&self, topic: &str) -> Arc<TopicBus> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(TopicBus::new(self.capacity)))
            .clone()
    }

    /// 调用方即将释放 `bus`；若只剩注册表和调用方持有，则移除该主题
    fn release(&self, topic: &str, bus: &Arc<TopicBus>) {
        let removed = self
            .topics
            .remove_if(topic, |_, current| {
                Arc::ptr_eq(current, bus) && Arc::strong_count(current) <= 2
            })
            .is_some();
        if removed {
            debug!("Topic bus {} released", topic);
        }
    }
}

/// mesh 上的一个节点
#[derive(Clone)]
pub struct LocalNode {
    peer_id: PeerId,
    mesh: LocalMesh,
}

#[async_trait]
impl Transport for LocalNode {
    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    async fn join(&self, topic: &str) -> Result<Arc<dyn Topic>, TransportError> {
        if topic.trim().is_empty() {
            return Err(TransportError::Join {
                topic: topic.to_string(),
                reason: "topic name is empty".to_string(),
            });
        }

        debug!("Peer {} joined topic {}", self.peer_id, topic);
        Ok(Arc::new(LocalTopic {
            name: topic.to_string(),
            peer_id: self.peer_id,
            bus: self.mesh.bus(topic),
            mesh: self.mesh.clone(),
            closed: CancellationToken::new(),
        }))
    }
}

struct LocalTopic {
    name: String,
    peer_id: PeerId,
    bus: Arc<TopicBus>,
    mesh: LocalMesh,
    closed: CancellationToken,
}

impl Drop for LocalTopic {
    fn drop(&mut self) {
        self.mesh.release(&self.name, &self.bus);
    }
}

#[async_trait]
impl Topic for LocalTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, data: Bytes) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::TopicClosed(self.name.clone()));
        }

        // 没有接收方时 send 返回错误，gossip 语义下不算失败
        let _ = self.bus.sender.send(Message {
            from: self.peer_id,
            topic: self.name.clone(),
            data,
        });
        Ok(())
    }

    fn subscribe(&self) -> Result<Box<dyn Subscription>, TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::TopicClosed(self.name.clone()));
        }

        let id = self.bus.next_subscription.fetch_add(1, Ordering::Relaxed);
        let receiver = self.bus.sender.subscribe();
        self.bus.subscribers.insert(id, self.peer_id);

        debug!("Peer {} subscribed to {} (subscription {})", self.peer_id, self.name, id);
        Ok(Box::new(LocalSubscription {
            id,
            peer_id: self.peer_id,
            topic: self.name.clone(),
            bus: self.bus.clone(),
            mesh: self.mesh.clone(),
            receiver: Some(receiver),
            closed: self.closed.clone(),
        }))
    }

    fn list_peers(&self) -> Vec<PeerId> {
        let peers: HashSet<PeerId> = self
            .bus
            .subscribers
            .iter()
            .map(|entry| *entry.value())
            .filter(|peer| *peer != self.peer_id)
            .collect();
        peers.into_iter().collect()
    }

    fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!("Peer {} closed topic {}", self.peer_id, self.name);
            self.closed.cancel();
        }
    }
}

struct LocalSubscription {
    id: u64,
    peer_id: PeerId,
    topic: String,
    bus: Arc<TopicBus>,
    mesh: LocalMesh,
    receiver: Option<broadcast::Receiver<Message>>,
    closed: CancellationToken,
}

#[async_trait]
impl Subscription for LocalSubscription {
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Message, TransportError> {
        loop {
            let receiver = self.receiver.as_mut().ok_or(TransportError::Cancelled)?;

            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = self.closed.cancelled() => {
                    return Err(TransportError::TopicClosed(self.topic.clone()));
                }
                received = receiver.recv() => received,
            };

            match received {
                // 自己发布的消息不回送
                Ok(message) if message.from == self.peer_id => continue,
                Ok(message) => return Ok(message),
                Err(RecvError::Lagged(skipped)) => return Err(TransportError::Lagged(skipped)),
                Err(RecvError::Closed) => {
                    return Err(TransportError::TopicClosed(self.topic.clone()));
                }
            }
        }
    }

    fn cancel(&mut self) {
        if self.receiver.take().is_some() {
            self.bus.subscribers.remove(&self.id);
            debug!("Subscription {} on {} cancelled", self.id, self.topic);
        }
    }
}

impl Drop for LocalSubscription {
    fn drop(&mut self) {
        self.cancel();
        self.mesh.release(&self.topic, &self.bus);
    }
}
