use crate::error::MediaError;
use bytes::Bytes;
use chrono::Utc;
use common::{codec, FrameMetadata, MediaType, Quality};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub const CODEC_NAME: &str = "h264";
pub const PROFILE: &str = "baseline";

/// 编码上下文
///
/// 绑定一个画质档位；更换画质时创建新的编码器，而不是修改运行中的实例。
#[derive(Debug)]
pub struct FrameEncoder {
    quality: Quality,
    running: AtomicBool,
}

impl FrameEncoder {
    pub fn new(quality: Quality) -> Self {
        Self {
            quality,
            running: AtomicBool::new(false),
        }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn bitrate(&self) -> u64 {
        self.quality.bitrate()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start(&self) -> Result<(), MediaError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MediaError::AlreadyStarted("encoder"))?;
        debug!("Encoder started: {} @ {} bps", self.quality, self.bitrate());
        Ok(())
    }

    /// 停止编码，重复调用无副作用
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!("Encoder stopped: {}", self.quality);
        }
    }

    /// 为一个原始数据单元生成元数据并打包成线上帧
    pub fn encode(&self, raw: &[u8], frame_id: u64) -> Result<Bytes, MediaError> {
        if !self.is_running() {
            return Err(MediaError::NotStarted("encoder"));
        }

        let metadata = FrameMetadata {
            frame_id,
            timestamp: Utc::now(),
            media_type: MediaType::Video,
            codec_name: CODEC_NAME.to_string(),
            quality: self.quality,
            bitrate: self.bitrate(),
            profile: PROFILE.to_string(),
            payload_size: raw.len(),
        };

        Ok(codec::encode(&metadata, raw)?)
    }
}
