// 媒体层：原始数据源与编解码上下文

pub mod decoder;
pub mod encoder;
pub mod source;
pub mod synthetic;

#[cfg(test)]
pub(crate) mod testing;

pub use decoder::{DecodedFrame, FrameDecoder};
pub use encoder::FrameEncoder;
pub use source::MediaSource;
pub use synthetic::SyntheticSource;
