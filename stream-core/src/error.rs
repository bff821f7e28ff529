// 帧分发管线 - 错误类型定义
//
// 按处理方式分层：
// - 生命周期误用：同步返回给调用方
// - 单帧的采集/发布/解码失败：记录日志，跳过该帧
// - 资源获取失败：仅使本次 start 失败，已获取的资源全部回滚

use crate::streaming::{BroadcastState, ViewerState};
use common::CodecError;
use thiserror::Error;

/// 媒体源与编解码上下文错误
#[derive(Debug, Error)]
pub enum MediaError {
    /// 媒体源暂时不可用（非致命）
    #[error("Media source unavailable: {0}")]
    Unavailable(String),

    #[error("{0} not started")]
    NotStarted(&'static str),

    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    #[error("Device error: {0}")]
    Device(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// 发布/订阅传输错误
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Failed to join topic {topic}: {reason}")]
    Join { topic: String, reason: String },

    #[error("Topic closed: {0}")]
    TopicClosed(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscription cancelled")]
    Cancelled,

    #[error("Subscriber lagged, skipped {0} messages")]
    Lagged(u64),
}

/// 广播端/观看端生命周期错误
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Already streaming (state: {0})")]
    AlreadyStreaming(BroadcastState),

    #[error("Already viewing (state: {0})")]
    AlreadyViewing(ViewerState),

    #[error("Cannot change quality while streaming")]
    CannotChangeWhileStreaming,

    #[error("Failed to start media source: {0}")]
    MediaStart(#[source] MediaError),

    #[error("Failed to start encoder: {0}")]
    EncoderStart(#[source] MediaError),

    #[error("Failed to start decoder: {0}")]
    DecoderStart(#[source] MediaError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// 二级分发投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// 消费者已断开，需从注册表移除
    #[error("Consumer disconnected")]
    Disconnected,

    /// 消费者缓冲已满，同样从注册表移除
    #[error("Consumer lagging, buffer full")]
    Lagging,
}

pub type Result<T> = std::result::Result<T, StreamError>;
