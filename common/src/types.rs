use crate::error::ParseQualityError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Metadata,
}

/// 画质档位
///
/// 每个档位绑定固定的目标码率，决定编码器配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "480p")]
    Sd480,
    #[default]
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    FullHd1080,
}

impl Quality {
    pub const ALL: [Quality; 3] = [Quality::Sd480, Quality::Hd720, Quality::FullHd1080];

    /// 目标码率（bits/s）
    pub fn bitrate(self) -> u64 {
        match self {
            Quality::Sd480 => 1_000_000,
            Quality::Hd720 => 2_000_000,
            Quality::FullHd1080 => 4_000_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Sd480 => "480p",
            Quality::Hd720 => "720p",
            Quality::FullHd1080 => "1080p",
        }
    }

    /// 名义分辨率（宽, 高）
    pub fn resolution(self) -> (u32, u32) {
        match self {
            Quality::Sd480 => (854, 480),
            Quality::Hd720 => (1280, 720),
            Quality::FullHd1080 => (1920, 1080),
        }
    }

    /// 从分辨率字符串推导画质，未识别的分辨率按720p处理
    pub fn from_resolution(resolution: &str) -> Self {
        match resolution.trim() {
            "1920x1080" => Quality::FullHd1080,
            "854x480" => Quality::Sd480,
            _ => Quality::Hd720,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = ParseQualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quality::ALL
            .into_iter()
            .find(|quality| quality.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseQualityError(s.to_string()))
    }
}

/// 帧元数据
///
/// 由一次编码调用构造，编码后不再修改。字段名与线上JSON保持一致。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// 帧序号，从1开始严格递增
    pub frame_id: u64,
    /// 采集时间
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    /// 编码标签，仅供参考
    #[serde(rename = "codec")]
    pub codec_name: String,
    pub quality: Quality,
    /// 当前画质对应的码率（bits/s）
    pub bitrate: u64,
    pub profile: String,
    /// 负载长度，必须等于紧随其后的负载字节数
    #[serde(rename = "size")]
    pub payload_size: usize,
}
