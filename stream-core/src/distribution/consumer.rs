use crate::error::DeliveryError;
use common::FanoutMessage;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// 二级消费者标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConsumerId(Uuid);

impl ConsumerId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 二级消费者（浏览器连接等）
///
/// 由分发任务调用，必须非阻塞。
pub trait ConsumerSink: Send + Sync {
    fn deliver(&self, message: &Arc<FanoutMessage>) -> Result<(), DeliveryError>;
}

/// 基于有界 mpsc 的消费者
///
/// 接收端关闭报告 `Disconnected`，缓冲区满报告 `Lagging`，两者都会让 relay 移除该消费者。
/// 移除后发送端随之释放，接收端读完已缓冲的消息后结束。
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    sender: mpsc::Sender<Arc<FanoutMessage>>,
}

impl ChannelConsumer {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Arc<FanoutMessage>>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

impl ConsumerSink for ChannelConsumer {
    fn deliver(&self, message: &Arc<FanoutMessage>) -> Result<(), DeliveryError> {
        self.sender
            .try_send(message.clone())
            .map_err(|e| match e {
                TrySendError::Full(_) => DeliveryError::Lagging,
                TrySendError::Closed(_) => DeliveryError::Disconnected,
            })
    }
}
