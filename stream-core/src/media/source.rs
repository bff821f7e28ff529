use crate::error::MediaError;
use async_trait::async_trait;
use bytes::Bytes;

/// 原始媒体数据源
///
/// 摄像头、屏幕采集或模拟源都实现该接口。广播端按固定节拍调用
/// `capture_unit`，单次失败只会跳过当前节拍。
#[async_trait]
pub trait MediaSource: Send {
    /// 数据源名称（用于日志）
    fn name(&self) -> &str {
        "media source"
    }

    /// 打开设备
    async fn start(&mut self) -> Result<(), MediaError>;

    /// 释放设备，重复调用无副作用
    async fn stop(&mut self) -> Result<(), MediaError>;

    /// 采集一个原始数据单元
    async fn capture_unit(&mut self) -> Result<Bytes, MediaError>;
}
