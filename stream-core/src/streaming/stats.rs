use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// 流统计信息
///
/// 广播端统计已成功发布的帧，观看端统计从传输层收到的帧（与解码成功与否无关）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    /// 帧数
    pub frames: u64,
    /// 字节数
    pub bytes: u64,
    /// 是否运行中
    pub active: bool,
    /// 最近一帧的时间
    pub last_frame_time: Option<DateTime<Utc>>,
    /// 本轮开始时间
    pub started_at: Option<DateTime<Utc>>,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新一轮统计：计数清零并标记为运行中
    pub fn begin(&mut self) {
        *self = Self {
            active: true,
            started_at: Some(Utc::now()),
            ..Self::default()
        };
    }

    /// 记录一帧，帧数与字节数在同一次更新中推进
    pub fn record(&mut self, bytes: usize) {
        self.frames += 1;
        self.bytes += bytes as u64;
        self.last_frame_time = Some(Utc::now());
    }

    pub fn finish(&mut self) {
        self.active = false;
    }

    fn elapsed_secs(&self) -> f64 {
        self.started_at
            .map(|start| (Utc::now() - start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    /// 自开始以来的平均帧率
    pub fn frame_rate(&self) -> f64 {
        let elapsed = self.elapsed_secs();
        if elapsed > 0.0 {
            self.frames as f64 / elapsed
        } else {
            0.0
        }
    }

    /// 自开始以来的平均吞吐量（Mbps）
    pub fn throughput_mbps(&self) -> f64 {
        let elapsed = self.elapsed_secs();
        if elapsed > 0.0 {
            (self.bytes as f64 * 8.0) / elapsed / 1_000_000.0
        } else {
            0.0
        }
    }

    /// 获取统计摘要
    pub fn summary(&self) -> String {
        format!(
            "Frames: {}, Bytes: {}, Active: {}, Rate: {:.1} fps, Throughput: {:.2} Mbps",
            self.frames,
            self.bytes,
            self.active,
            self.frame_rate(),
            self.throughput_mbps()
        )
    }
}

/// 统计信息的只读句柄，可跨任务克隆
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    inner: Arc<RwLock<StreamStats>>,
}

impl StatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 一致性快照
    pub async fn snapshot(&self) -> StreamStats {
        self.inner.read().await.clone()
    }

    pub(crate) async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut StreamStats),
    {
        let mut stats = self.inner.write().await;
        f(&mut stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_resets_counters() {
        let mut stats = StreamStats::new();
        stats.record(100);
        stats.record(50);
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.bytes, 150);

        stats.begin();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.bytes, 0);
        assert!(stats.active);
        assert!(stats.started_at.is_some());
        assert!(stats.last_frame_time.is_none());

        stats.finish();
        assert!(!stats.active);
    }

    #[test]
    fn test_rates_without_start_are_zero() {
        let mut stats = StreamStats::new();
        stats.record(1_000);
        assert_eq!(stats.frame_rate(), 0.0);
        assert_eq!(stats.throughput_mbps(), 0.0);
        assert!(stats.summary().contains("Frames: 1"));
    }

    #[test]
    fn test_rates_use_elapsed_time() {
        let mut stats = StreamStats::new();
        stats.begin();
        stats.started_at = Some(Utc::now() - chrono::Duration::seconds(2));
        for _ in 0..60 {
            stats.record(25_000);
        }

        let fps = stats.frame_rate();
        assert!((fps - 30.0).abs() < 1.0, "unexpected frame rate {}", fps);

        // 1.5 MB over 2 s = 6 Mbps
        let mbps = stats.throughput_mbps();
        assert!((mbps - 6.0).abs() < 0.2, "unexpected throughput {}", mbps);
    }

    #[tokio::test]
    async fn test_handle_snapshot() {
        let handle = StatsHandle::new();
        handle.update(|s| s.begin()).await;
        handle.update(|s| s.record(10)).await;

        let clone = handle.clone();
        let snapshot = clone.snapshot().await;
        assert_eq!(snapshot.frames, 1);
        assert_eq!(snapshot.bytes, 10);
        assert!(snapshot.active);
    }
}
