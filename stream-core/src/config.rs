use common::Quality;
use std::time::Duration;

/// 默认主题名
pub const DEFAULT_TOPIC: &str = "meshlink/church/stream";

/// 默认帧率
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// 观看人数刷新周期
pub const VIEWER_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// 广播端构造参数，构造后只读
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub topic: String,
    pub quality: Quality,
    pub frame_rate: u32,
    pub viewer_refresh_interval: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            quality: Quality::default(),
            frame_rate: DEFAULT_FRAME_RATE,
            viewer_refresh_interval: VIEWER_REFRESH_INTERVAL,
        }
    }
}

impl BroadcastSettings {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_viewer_refresh_interval(mut self, interval: Duration) -> Self {
        self.viewer_refresh_interval = interval;
        self
    }
}

/// 观看端构造参数
#[derive(Debug, Clone)]
pub struct ViewerSettings {
    pub topic: String,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
        }
    }
}

impl ViewerSettings {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}
