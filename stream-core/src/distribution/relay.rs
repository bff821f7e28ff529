// 二级扇出分发
//
// 广播端把原始帧交给 relay，relay 生成面向浏览器的消息并非阻塞地放入有界队列；
// 队列满时整条消息丢弃。单个分发任务从队列取消息，逐个投递给当前注册的消费者，
// 投递失败（断开或缓冲区已满）的消费者会被移出注册表，不影响其他消费者。

use super::consumer::{ConsumerId, ConsumerSink};
use super::render::FrameRenderer;
use crate::error::DeliveryError;
use crate::streaming::{BroadcastObserver, PublishedFrame};
use common::{FanoutMessage, Quality};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 默认队列容量
pub const DEFAULT_RELAY_CAPACITY: usize = 64;

/// 入队结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// 队列已满（或分发任务已退出），消息被丢弃
    Dropped,
}

/// relay 统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub consumers: usize,
    pub queued: u64,
    pub dropped: u64,
    pub delivered: u64,
    /// 因缓冲区满被移除的消费者数
    pub lagged: u64,
    /// 因连接关闭被移除的消费者数
    pub disconnected: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    lagged: AtomicU64,
    disconnected: AtomicU64,
}

#[derive(Default)]
struct Registry {
    consumers: DashMap<ConsumerId, Arc<dyn ConsumerSink>>,
    counters: Counters,
}

/// 扇出 relay，进程生命周期内常驻，可克隆共享
#[derive(Clone)]
pub struct FanoutRelay {
    queue: mpsc::Sender<Arc<FanoutMessage>>,
    registry: Arc<Registry>,
    renderer: Arc<dyn FrameRenderer>,
    capacity: usize,
}

impl FanoutRelay {
    /// 创建 relay 与其分发任务，分发任务需由调用方运行
    pub fn new(capacity: usize, renderer: Arc<dyn FrameRenderer>) -> (Self, RelayDispatcher) {
        let capacity = capacity.max(1);
        let (queue, receiver) = mpsc::channel(capacity);
        let registry = Arc::new(Registry::default());

        let relay = Self {
            queue,
            registry: registry.clone(),
            renderer,
            capacity,
        };
        let dispatcher = RelayDispatcher { receiver, registry };
        (relay, dispatcher)
    }

    /// 创建 relay 并启动分发任务
    pub fn spawn(
        capacity: usize,
        renderer: Arc<dyn FrameRenderer>,
        cancel: CancellationToken,
    ) -> Self {
        let (relay, dispatcher) = Self::new(capacity, renderer);
        tokio::spawn(dispatcher.run(cancel));
        relay
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 生成消费者消息并尝试入队，从不阻塞
    pub fn broadcast_frame(&self, frame: &[u8], frame_number: u64, quality: Quality) -> EnqueueOutcome {
        let image = self.renderer.render(frame, frame_number);
        let message = Arc::new(FanoutMessage::frame(frame_number, frame.len(), quality, image));
        let counters = &self.registry.counters;

        match self.queue.try_send(message) {
            Ok(()) => {
                counters.queued.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Relay queue full, dropped frame {}", frame_number);
                EnqueueOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Relay dispatcher gone, dropped frame {}", frame_number);
                EnqueueOutcome::Dropped
            }
        }
    }

    pub fn register_consumer(&self, sink: Arc<dyn ConsumerSink>) -> ConsumerId {
        let id = ConsumerId::random();
        self.registry.consumers.insert(id, sink);
        info!(
            "Consumer {} connected (total: {})",
            id,
            self.registry.consumers.len()
        );
        id
    }

    /// 移除消费者，返回是否存在
    pub fn deregister_consumer(&self, id: &ConsumerId) -> bool {
        let removed = self.registry.consumers.remove(id).is_some();
        if removed {
            info!(
                "Consumer {} disconnected (total: {})",
                id,
                self.registry.consumers.len()
            );
        }
        removed
    }

    pub fn consumer_count(&self) -> usize {
        self.registry.consumers.len()
    }

    pub fn stats(&self) -> RelayStats {
        let counters = &self.registry.counters;
        RelayStats {
            consumers: self.registry.consumers.len(),
            queued: counters.queued.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            lagged: counters.lagged.load(Ordering::Relaxed),
            disconnected: counters.disconnected.load(Ordering::Relaxed),
        }
    }
}

/// relay 的分发任务
pub struct RelayDispatcher {
    receiver: mpsc::Receiver<Arc<FanoutMessage>>,
    registry: Arc<Registry>,
}

impl RelayDispatcher {
    /// 运行到取消或所有 relay 句柄被释放
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!("Relay dispatcher started");

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = self.receiver.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.dispatch(&message);
        }

        debug!("Relay dispatcher exited");
    }

    fn dispatch(&self, message: &Arc<FanoutMessage>) {
        // 先取快照，投递和移除时不持有注册表的分片锁
        let consumers: Vec<(ConsumerId, Arc<dyn ConsumerSink>)> = self
            .registry
            .consumers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let counters = &self.registry.counters;
        for (id, sink) in consumers {
            match sink.deliver(message) {
                Ok(()) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(reason) => {
                    // 任何投递失败都视为断开
                    if self.registry.consumers.remove(&id).is_some() {
                        match reason {
                            DeliveryError::Lagging => {
                                counters.lagged.fetch_add(1, Ordering::Relaxed);
                            }
                            DeliveryError::Disconnected => {
                                counters.disconnected.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        info!(
                            "Consumer {} dropped on frame {}: {} (total: {})",
                            id,
                            message.frame,
                            reason,
                            self.registry.consumers.len()
                        );
                    }
                }
            }
        }
    }
}

/// 把每第 `stride` 个发布帧转给 relay 的观察者
pub struct RelayFeed {
    relay: FanoutRelay,
    stride: u64,
}

impl RelayFeed {
    pub fn new(relay: FanoutRelay, stride: u64) -> Self {
        Self {
            relay,
            stride: stride.max(1),
        }
    }
}

impl BroadcastObserver for RelayFeed {
    fn on_frame_published(&self, frame: &PublishedFrame) {
        if frame.frame_id % self.stride == 0 {
            self.relay
                .broadcast_frame(&frame.raw, frame.frame_id, frame.quality);
        }
    }
}
