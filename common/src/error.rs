use thiserror::Error;

/// 帧编解码错误
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error("Metadata length mismatch: declared {declared} bytes, {available} available")]
    MetadataLengthMismatch { declared: usize, available: usize },

    #[error("Failed to parse frame metadata: {0}")]
    MetadataParse(#[source] serde_json::Error),

    #[error("Payload size mismatch: expected {expected}, got {actual}")]
    PayloadSizeMismatch { expected: usize, actual: usize },

    #[error("Failed to serialize frame metadata: {0}")]
    MetadataSerialize(#[source] serde_json::Error),

    #[error("Metadata too large: {0} bytes")]
    MetadataTooLarge(usize),
}

/// 画质标签解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown quality: {0}")]
pub struct ParseQualityError(pub String);

pub type Result<T> = std::result::Result<T, CodecError>;
