use crate::error::MediaError;
use bytes::Bytes;
use common::{codec, FrameMetadata, Quality};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// 解码后的帧：元数据 + 负载（与入站缓冲区共享内存）
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub metadata: FrameMetadata,
    pub payload: Bytes,
}

impl DecodedFrame {
    pub fn frame_id(&self) -> u64 {
        self.metadata.frame_id
    }

    pub fn quality(&self) -> Quality {
        self.metadata.quality
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn bitrate(&self) -> u64 {
        self.metadata.bitrate
    }
}

/// 解码上下文
#[derive(Debug, Default)]
pub struct FrameDecoder {
    running: AtomicBool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start(&self) -> Result<(), MediaError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MediaError::AlreadyStarted("decoder"))?;
        debug!("Decoder started");
        Ok(())
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!("Decoder stopped");
        }
    }

    pub fn decode(&self, data: &Bytes) -> Result<DecodedFrame, MediaError> {
        if !self.is_running() {
            return Err(MediaError::NotStarted("decoder"));
        }

        let (metadata, payload) = codec::decode(data)?;
        Ok(DecodedFrame { metadata, payload })
    }
}
