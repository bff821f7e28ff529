// 广播端
//
// 状态机：Idle → Streaming → Stopped
//
// 启动时按顺序获取媒体源与编码器，任一失败都会回滚已获取的资源并保持 Idle。
// 节拍循环每个周期执行一次 采集 → 编码 → 发布，只有发布成功才推进计数；
// 单次采集/编码/发布失败只跳过当前节拍。

use super::pacer::FramePacer;
use super::stats::{StatsHandle, StreamStats};
use crate::config::BroadcastSettings;
use crate::error::{Result, StreamError};
use crate::media::{FrameEncoder, MediaSource};
use crate::transport::{Topic, Transport};
use bytes::Bytes;
use common::Quality;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 广播端状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastState {
    Idle,
    Streaming,
    Stopped,
}

impl fmt::Display for BroadcastState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BroadcastState::Idle => "idle",
            BroadcastState::Streaming => "streaming",
            BroadcastState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// 一次成功发布的帧
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    pub frame_id: u64,
    pub quality: Quality,
    /// 媒体源给出的原始数据
    pub raw: Bytes,
    /// 发布到主题的线上帧
    pub encoded: Bytes,
}

/// 帧发布观察者
///
/// 在节拍循环内同步调用，不会与自身并发执行；实现方不应阻塞。
pub trait BroadcastObserver: Send + Sync {
    fn on_frame_published(&self, frame: &PublishedFrame);
}

/// 广播端只读视图，供 HTTP 等外部调用方读取而无需锁住广播端本身
#[derive(Clone)]
pub struct BroadcastMonitor {
    stats: StatsHandle,
    viewers: Arc<AtomicUsize>,
}

impl BroadcastMonitor {
    pub async fn stats(&self) -> StreamStats {
        self.stats.snapshot().await
    }

    /// 近似观看人数（周期刷新）
    pub fn viewer_count(&self) -> usize {
        self.viewers.load(Ordering::Relaxed)
    }
}

struct RunHandle {
    cancel: CancellationToken,
    pacing: JoinHandle<()>,
    refresher: JoinHandle<()>,
}

/// 广播端
pub struct Broadcaster {
    settings: BroadcastSettings,
    transport: Arc<dyn Transport>,
    topic: Arc<dyn Topic>,
    topic_closed: bool,
    source: Arc<Mutex<Box<dyn MediaSource>>>,
    encoder: Arc<FrameEncoder>,
    quality: Quality,
    state: BroadcastState,
    stats: StatsHandle,
    viewers: Arc<AtomicUsize>,
    observer: Option<Arc<dyn BroadcastObserver>>,
    parent: CancellationToken,
    run: Option<RunHandle>,
}

impl Broadcaster {
    /// 创建广播端并加入主题
    pub async fn new(
        transport: Arc<dyn Transport>,
        source: Box<dyn MediaSource>,
        settings: BroadcastSettings,
    ) -> Result<Self> {
        let topic = transport.join(&settings.topic).await?;
        let quality = settings.quality;

        info!(
            "Broadcaster created: topic={}, quality={}, frame_rate={}",
            settings.topic, quality, settings.frame_rate
        );

        Ok(Self {
            settings,
            transport,
            topic,
            topic_closed: false,
            source: Arc::new(Mutex::new(source)),
            encoder: Arc::new(FrameEncoder::new(quality)),
            quality,
            state: BroadcastState::Idle,
            stats: StatsHandle::new(),
            viewers: Arc::new(AtomicUsize::new(0)),
            observer: None,
            parent: CancellationToken::new(),
            run: None,
        })
    }

    /// 注册帧发布观察者
    pub fn with_observer(mut self, observer: Arc<dyn BroadcastObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// 绑定外部生命周期，取消时所有后台循环随之退出
    pub fn with_cancellation(mut self, parent: CancellationToken) -> Self {
        self.parent = parent;
        self
    }

    pub fn state(&self) -> BroadcastState {
        self.state
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn topic(&self) -> &str {
        &self.settings.topic
    }

    pub fn settings(&self) -> &BroadcastSettings {
        &self.settings
    }

    pub fn is_streaming(&self) -> bool {
        self.state == BroadcastState::Streaming
    }

    pub async fn stats(&self) -> StreamStats {
        self.stats.snapshot().await
    }

    pub fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.load(Ordering::Relaxed)
    }

    pub fn monitor(&self) -> BroadcastMonitor {
        BroadcastMonitor {
            stats: self.stats.clone(),
            viewers: self.viewers.clone(),
        }
    }

    /// 开始推流
    pub async fn start(&mut self) -> Result<()> {
        if self.state != BroadcastState::Idle {
            return Err(StreamError::AlreadyStreaming(self.state));
        }

        // stop 会关闭主题句柄，重新启动前需要重新加入
        if self.topic_closed {
            self.topic = self.transport.join(&self.settings.topic).await?;
            self.topic_closed = false;
        }

        {
            let mut source = self.source.lock().await;
            source.start().await.map_err(StreamError::MediaStart)?;

            if let Err(e) = self.encoder.start() {
                if let Err(stop_err) = source.stop().await {
                    warn!("Failed to release {} after encoder error: {}", source.name(), stop_err);
                }
                return Err(StreamError::EncoderStart(e));
            }
        }

        self.stats.update(|s| s.begin()).await;
        self.viewers.store(0, Ordering::Relaxed);
        self.state = BroadcastState::Streaming;

        let cancel = self.parent.child_token();

        let pacing = PacingLoop {
            topic: self.topic.clone(),
            source: self.source.clone(),
            encoder: self.encoder.clone(),
            stats: self.stats.clone(),
            observer: self.observer.clone(),
            pacer: FramePacer::new(self.settings.frame_rate),
            cancel: cancel.clone(),
        };
        let pacing = tokio::spawn(pacing.run());

        let refresher = tokio::spawn(refresh_viewer_count(
            self.topic.clone(),
            self.viewers.clone(),
            self.settings.viewer_refresh_interval,
            cancel.clone(),
        ));

        self.run = Some(RunHandle {
            cancel,
            pacing,
            refresher,
        });

        info!(
            "Broadcasting started on {} ({}, {} bps)",
            self.settings.topic,
            self.quality,
            self.encoder.bitrate()
        );
        Ok(())
    }

    /// 停止推流，非 Streaming 状态下无操作
    pub async fn stop(&mut self) {
        if self.state != BroadcastState::Streaming {
            return;
        }

        if let Some(run) = self.run.take() {
            run.cancel.cancel();
            for (name, handle) in [("pacing loop", run.pacing), ("viewer refresher", run.refresher)] {
                if let Err(e) = handle.await {
                    error!("Broadcaster {} task failed: {}", name, e);
                }
            }
        }

        self.encoder.stop();
        {
            let mut source = self.source.lock().await;
            if let Err(e) = source.stop().await {
                warn!("Failed to stop {}: {}", source.name(), e);
            }
        }
        self.topic.close();
        self.topic_closed = true;
        self.viewers.store(0, Ordering::Relaxed);

        self.stats.update(|s| s.finish()).await;
        self.state = BroadcastState::Stopped;

        let stats = self.stats.snapshot().await;
        info!("Broadcasting stopped: {}", stats.summary());
    }

    /// 修改画质，仅在非 Streaming 状态下允许
    ///
    /// 重新创建编码器；已停止的广播端回到 Idle，可以再次启动。
    pub fn set_quality(&mut self, quality: Quality) -> Result<()> {
        if self.state == BroadcastState::Streaming {
            return Err(StreamError::CannotChangeWhileStreaming);
        }

        self.encoder = Arc::new(FrameEncoder::new(quality));
        self.quality = quality;
        self.settings.quality = quality;
        self.state = BroadcastState::Idle;

        info!("Quality changed to {} ({} bps)", quality, quality.bitrate());
        Ok(())
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        if let Some(run) = &self.run {
            run.cancel.cancel();
        }
    }
}

struct PacingLoop {
    topic: Arc<dyn Topic>,
    source: Arc<Mutex<Box<dyn MediaSource>>>,
    encoder: Arc<FrameEncoder>,
    stats: StatsHandle,
    observer: Option<Arc<dyn BroadcastObserver>>,
    pacer: FramePacer,
    cancel: CancellationToken,
}

impl PacingLoop {
    async fn run(self) {
        let mut ticker = self.pacer.ticker();
        let mut published: u64 = 0;

        debug!("Pacing loop started: period={}ms", self.pacer.period().as_millis());

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let raw = match self.source.lock().await.capture_unit().await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Capture failed, skipping tick: {}", e);
                    continue;
                }
            };

            // 采集期间收到停止信号时不再发出新帧
            if self.cancel.is_cancelled() {
                break;
            }

            let frame_id = published + 1;
            let encoded = match self.encoder.encode(&raw, frame_id) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!("Encode failed for frame {}: {}", frame_id, e);
                    continue;
                }
            };

            if let Err(e) = self.topic.publish(encoded.clone()).await {
                warn!("Publish failed for frame {}: {}", frame_id, e);
                continue;
            }
            published = frame_id;

            if let Some(observer) = &self.observer {
                observer.on_frame_published(&PublishedFrame {
                    frame_id,
                    quality: self.encoder.quality(),
                    raw,
                    encoded: encoded.clone(),
                });
            }

            let size = encoded.len();
            self.stats.update(|s| s.record(size)).await;

            if published % 30 == 0 {
                info!("Published {} frames ({} bytes last)", published, size);
            } else {
                debug!("Published frame {}: {} bytes", frame_id, size);
            }
        }

        debug!("Pacing loop exited after {} frames", published);
    }
}

async fn refresh_viewer_count(
    topic: Arc<dyn Topic>,
    viewers: Arc<AtomicUsize>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period.max(Duration::from_millis(1)));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let count = topic.list_peers().len();
        let previous = viewers.swap(count, Ordering::Relaxed);
        if previous != count {
            debug!("Viewer count on {}: {} -> {}", topic.name(), previous, count);
        }
    }
}
