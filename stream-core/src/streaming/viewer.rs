// 观看端
//
// 状态机：Idle → Viewing → Stopped
//
// 接收循环只在“等待下一条消息”处挂起。每条消息先计入统计（按传输层收到的
// 原始大小），再解码；解码失败只记录日志，原始数据回调照常触发。

use super::stats::{StatsHandle, StreamStats};
use crate::config::ViewerSettings;
use crate::error::{Result, StreamError, TransportError};
use crate::media::{DecodedFrame, FrameDecoder};
use crate::transport::{Subscription, Topic, Transport};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 观看端状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerState {
    Idle,
    Viewing,
    Stopped,
}

impl fmt::Display for ViewerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewerState::Idle => "idle",
            ViewerState::Viewing => "viewing",
            ViewerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

type DataCallback = Arc<dyn Fn(&Bytes) + Send + Sync>;
type FrameCallback = Arc<dyn Fn(&DecodedFrame) + Send + Sync>;

/// 观看端回调：至多一个原始数据回调和一个解码帧回调
#[derive(Clone, Default)]
pub struct ViewerCallbacks {
    on_data: Option<DataCallback>,
    on_frame: Option<FrameCallback>,
}

impl ViewerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原始数据回调，解码失败时同样触发
    pub fn on_data<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        self.on_data = Some(Arc::new(callback));
        self
    }

    /// 解码帧回调
    pub fn on_frame<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DecodedFrame) + Send + Sync + 'static,
    {
        self.on_frame = Some(Arc::new(callback));
        self
    }

    fn deliver(&self, data: &Bytes, frame: Option<&DecodedFrame>) {
        if let (Some(callback), Some(frame)) = (&self.on_frame, frame) {
            callback(frame);
        }
        if let Some(callback) = &self.on_data {
            callback(data);
        }
    }
}

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// 观看端
pub struct Viewer {
    settings: ViewerSettings,
    topic: Arc<dyn Topic>,
    subscription: Option<Box<dyn Subscription>>,
    decoder: Arc<FrameDecoder>,
    callbacks: ViewerCallbacks,
    state: ViewerState,
    stats: StatsHandle,
    parent: CancellationToken,
    run: Option<RunHandle>,
}

impl Viewer {
    /// 加入主题并订阅
    pub async fn new(
        transport: Arc<dyn Transport>,
        settings: ViewerSettings,
        callbacks: ViewerCallbacks,
    ) -> Result<Self> {
        let topic = transport.join(&settings.topic).await?;
        let subscription = topic.subscribe()?;

        info!(
            "Viewer {} subscribed to {}",
            transport.local_peer_id(),
            settings.topic
        );

        Ok(Self {
            settings,
            topic,
            subscription: Some(subscription),
            decoder: Arc::new(FrameDecoder::new()),
            callbacks,
            state: ViewerState::Idle,
            stats: StatsHandle::new(),
            parent: CancellationToken::new(),
            run: None,
        })
    }

    /// 绑定外部生命周期
    pub fn with_cancellation(mut self, parent: CancellationToken) -> Self {
        self.parent = parent;
        self
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub fn topic(&self) -> &str {
        &self.settings.topic
    }

    pub async fn stats(&self) -> StreamStats {
        self.stats.snapshot().await
    }

    pub fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    /// 开始接收
    pub async fn start_viewing(&mut self) -> Result<()> {
        if self.state != ViewerState::Idle {
            return Err(StreamError::AlreadyViewing(self.state));
        }

        let subscription = match self.subscription.take() {
            Some(subscription) => subscription,
            None => self.topic.subscribe()?,
        };

        if let Err(e) = self.decoder.start() {
            self.subscription = Some(subscription);
            return Err(StreamError::DecoderStart(e));
        }

        self.stats.update(|s| s.begin()).await;
        self.state = ViewerState::Viewing;

        let cancel = self.parent.child_token();
        let receive = ReceiveLoop {
            subscription,
            decoder: self.decoder.clone(),
            callbacks: self.callbacks.clone(),
            stats: self.stats.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(receive.run());
        self.run = Some(RunHandle { cancel, task });

        info!("Viewing started on {}", self.settings.topic);
        Ok(())
    }

    /// 停止接收，非 Viewing 状态下无操作
    pub async fn stop(&mut self) {
        if self.state != ViewerState::Viewing {
            return;
        }

        if let Some(run) = self.run.take() {
            run.cancel.cancel();
            if let Err(e) = run.task.await {
                error!("Viewer receive task failed: {}", e);
            }
        }

        self.decoder.stop();
        self.topic.close();

        self.stats.update(|s| s.finish()).await;
        self.state = ViewerState::Stopped;

        let stats = self.stats.snapshot().await;
        info!("Viewing stopped: {}", stats.summary());
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        if let Some(run) = &self.run {
            run.cancel.cancel();
        }
    }
}

struct ReceiveLoop {
    subscription: Box<dyn Subscription>,
    decoder: Arc<FrameDecoder>,
    callbacks: ViewerCallbacks,
    stats: StatsHandle,
    cancel: CancellationToken,
}

impl ReceiveLoop {
    async fn run(mut self) {
        let mut received: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let message = match self.subscription.next(&self.cancel).await {
                Ok(message) => message,
                Err(TransportError::Cancelled) => break,
                Err(TransportError::TopicClosed(topic)) => {
                    info!("Topic {} closed, receive loop exiting", topic);
                    break;
                }
                Err(TransportError::Lagged(skipped)) => {
                    warn!("Viewer lagged behind, {} messages skipped", skipped);
                    continue;
                }
                Err(e) => {
                    warn!("Receive failed: {}", e);
                    continue;
                }
            };

            received += 1;
            let size = message.data.len();
            self.stats.update(|s| s.record(size)).await;

            match self.decoder.decode(&message.data) {
                Ok(frame) => {
                    debug!(
                        "Received frame {} from {}: {} bytes, {}",
                        frame.frame_id(),
                        message.from,
                        frame.size(),
                        frame.quality()
                    );
                    self.callbacks.deliver(&message.data, Some(&frame));
                }
                Err(e) => {
                    warn!("Failed to decode {} bytes from {}: {}", size, message.from, e);
                    self.callbacks.deliver(&message.data, None);
                }
            }

            if received % 30 == 0 {
                info!("Received {} frames", received);
            }
        }

        self.subscription.cancel();
        debug!("Receive loop exited after {} messages", received);
    }
}
