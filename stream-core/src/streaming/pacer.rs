// 帧节拍控制

use crate::config::DEFAULT_FRAME_RATE;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// 固定帧率节拍器
///
/// 周期为 `1000 / fps` 毫秒（30fps 时为 33ms），第一次触发在启动一个周期之后。
/// 处理落后时跳过错过的节拍，不会连续补发。
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    frame_rate: u32,
    period: Duration,
}

impl FramePacer {
    pub fn new(frame_rate: u32) -> Self {
        let frame_rate = if frame_rate > 0 {
            frame_rate
        } else {
            DEFAULT_FRAME_RATE
        };
        let period = Duration::from_millis((1000 / frame_rate as u64).max(1));

        debug!(
            "Creating FramePacer: frame_rate={}, period={}ms",
            frame_rate,
            period.as_millis()
        );

        Self { frame_rate, period }
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn ticker(&self) -> Interval {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE)
    }
}
