// 模拟媒体源
//
// 不依赖任何采集设备，按码率与帧率生成模拟的 H.264 访问单元，
// 用于演示与联调。

use super::source::MediaSource;
use crate::error::MediaError;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use common::Quality;
use tracing::info;

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

// 1280x720 baseline profile 的最小 SPS
const SPS: [u8; 35] = [
    0x67, // NAL type 7 (SPS)
    0x42, 0xC0, 0x1E, // profile_idc, constraints, level_idc
    0xFF, 0xE1, 0x00, 0x19, 0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x01, 0x40, 0x16, 0xE8, 0x06, 0xD0, 0xA1,
    0x35, 0x00, 0x00, 0x03, 0x00, 0x01, 0x00, 0x00, 0x03, 0x00, 0x32, 0x0F, 0x16, 0x2D, 0x96,
];

const PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];

const NAL_IDR: u8 = 0x65;
const NAL_P_SLICE: u8 = 0x41;

/// 模拟 H.264 数据源
pub struct SyntheticSource {
    fps: u32,
    bytes_per_unit: usize,
    units: u64,
    running: bool,
}

impl SyntheticSource {
    /// `bitrate` 为 bit/s
    pub fn new(bitrate: u64, fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            fps,
            bytes_per_unit: (bitrate / fps as u64 / 8) as usize,
            units: 0,
            running: false,
        }
    }

    pub fn for_quality(quality: Quality, fps: u32) -> Self {
        Self::new(quality.bitrate(), fps)
    }

    pub fn bytes_per_unit(&self) -> usize {
        self.bytes_per_unit
    }

    pub fn units_produced(&self) -> u64 {
        self.units
    }

    fn is_keyframe(&self) -> bool {
        self.units % self.fps as u64 == 0
    }

    fn build_unit(&self) -> Bytes {
        let mut unit = BytesMut::with_capacity(self.bytes_per_unit.max(64));

        if self.is_keyframe() {
            unit.put_slice(&START_CODE);
            unit.put_slice(&SPS);
            unit.put_slice(&START_CODE);
            unit.put_slice(&PPS);
            unit.put_slice(&START_CODE);
            unit.put_u8(NAL_IDR);
        } else {
            unit.put_slice(&START_CODE);
            unit.put_u8(NAL_P_SLICE);
        }

        // 填充到目标大小
        let remaining = self.bytes_per_unit.saturating_sub(unit.len());
        for i in 0..remaining {
            unit.put_u8(((self.units + i as u64) % 256) as u8);
        }

        unit.freeze()
    }
}

#[async_trait]
impl MediaSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic h264"
    }

    async fn start(&mut self) -> Result<(), MediaError> {
        if self.running {
            return Err(MediaError::AlreadyStarted("synthetic source"));
        }
        self.running = true;
        info!(
            "Synthetic source started: {} fps, {} bytes per unit",
            self.fps, self.bytes_per_unit
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), MediaError> {
        if self.running {
            self.running = false;
            info!("Synthetic source stopped after {} units", self.units);
        }
        Ok(())
    }

    async fn capture_unit(&mut self) -> Result<Bytes, MediaError> {
        if !self.running {
            return Err(MediaError::NotStarted("synthetic source"));
        }

        let unit = self.build_unit();
        self.units += 1;
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refuses_capture_until_started() {
        let mut source = SyntheticSource::new(2_000_000, 30);
        assert!(matches!(
            source.capture_unit().await,
            Err(MediaError::NotStarted(_))
        ));

        source.start().await.unwrap();
        assert!(source.capture_unit().await.is_ok());

        source.stop().await.unwrap();
        assert!(source.capture_unit().await.is_err());
    }

    #[tokio::test]
    async fn test_unit_size_follows_bitrate() {
        let mut source = SyntheticSource::for_quality(Quality::Hd720, 30);
        // 2 Mbps / 30 fps / 8
        assert_eq!(source.bytes_per_unit(), 8333);

        source.start().await.unwrap();
        let unit = source.capture_unit().await.unwrap();
        assert_eq!(unit.len(), 8333);
    }

    #[tokio::test]
    async fn test_keyframe_every_fps_units() {
        let mut source = SyntheticSource::new(240_000, 10);
        source.start().await.unwrap();

        for n in 0..20u64 {
            let unit = source.capture_unit().await.unwrap();
            assert_eq!(&unit[..4], &START_CODE);
            if n % 10 == 0 {
                assert_eq!(unit[4], 0x67, "unit {} should open with SPS", n);
                let idr_offset = 4 + SPS.len() + 4 + PPS.len() + 4;
                assert_eq!(unit[idr_offset], NAL_IDR);
            } else {
                assert_eq!(unit[4], NAL_P_SLICE);
            }
        }
        assert_eq!(source.units_produced(), 20);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut source = SyntheticSource::new(1_000_000, 30);
        source.start().await.unwrap();
        assert!(matches!(
            source.start().await,
            Err(MediaError::AlreadyStarted(_))
        ));
    }
}
