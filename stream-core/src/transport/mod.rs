// 发布/订阅传输抽象
//
// 广播端与观看端只依赖这里的接口；具体实现可以是进程内总线（`local`），
// 也可以是真实的 P2P gossip 网络。

pub mod local;

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use local::{LocalMesh, LocalNode};

/// 节点标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(Uuid);

impl PeerId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 从主题收到的一条消息
#[derive(Debug, Clone)]
pub struct Message {
    pub from: PeerId,
    pub topic: String,
    pub data: Bytes,
}

/// 主题式发布/订阅网络
#[async_trait]
pub trait Transport: Send + Sync {
    /// 本节点标识
    fn local_peer_id(&self) -> PeerId;

    /// 加入主题，返回主题句柄
    async fn join(&self, topic: &str) -> Result<Arc<dyn Topic>, TransportError>;
}

/// 已加入的主题句柄
#[async_trait]
pub trait Topic: Send + Sync {
    fn name(&self) -> &str;

    /// 向主题发布一条消息，没有订阅者时同样视为成功
    async fn publish(&self, data: Bytes) -> Result<(), TransportError>;

    fn subscribe(&self) -> Result<Box<dyn Subscription>, TransportError>;

    /// 当前订阅该主题的其他节点（最终一致，仅用于统计）
    fn list_peers(&self) -> Vec<PeerId>;

    /// 关闭句柄，之后的发布失败，由该句柄创建的订阅结束
    fn close(&self);
}

/// 主题订阅
#[async_trait]
pub trait Subscription: Send + Sync {
    /// 等待下一条消息，直到收到消息或 `cancel` 被触发
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Message, TransportError>;

    /// 取消订阅，幂等
    fn cancel(&mut self);
}
