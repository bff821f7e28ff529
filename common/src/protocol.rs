use crate::types::Quality;
use serde::{Deserialize, Serialize};

/// 推送给浏览器端的事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutEventType {
    Frame,
}

/// 二级分发消息
///
/// 字段名与浏览器端脚本约定一致（`imageData` / `hasImage`）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutMessage {
    #[serde(rename = "type")]
    pub event_type: FanoutEventType,
    /// 帧序号
    pub frame: u64,
    /// 负载字节数
    pub size: usize,
    pub quality: Quality,
    /// 预览图（data URL），由渲染器决定
    #[serde(rename = "imageData", default)]
    pub image_data: Option<String>,
    #[serde(rename = "hasImage")]
    pub has_image: bool,
}

impl FanoutMessage {
    pub fn frame(frame: u64, size: usize, quality: Quality, image_data: Option<String>) -> Self {
        Self {
            event_type: FanoutEventType::Frame,
            frame,
            size,
            quality,
            has_image: image_data.is_some(),
            image_data,
        }
    }
}
