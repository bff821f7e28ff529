// MeshLink 帧分发管线
//
// 单一广播端通过发布/订阅通道把实时帧分发给动态加入的观看端。
//
// # 核心组件
//
// - `Broadcaster`: 固定节拍 采集→编码→发布
// - `Viewer`: 订阅→解码→回调
// - `FanoutRelay`: 面向浏览器等二级消费者的有界扇出，满则丢弃
// - `Transport` / `MediaSource`: 外部协作方的抽象接口

pub mod config;
pub mod distribution;
pub mod error;
pub mod media;
pub mod streaming;
pub mod transport;

// 重新导出核心类型
pub use config::{BroadcastSettings, ViewerSettings, DEFAULT_TOPIC};
pub use distribution::{
    ChannelConsumer, ConsumerId, ConsumerSink, EnqueueOutcome, FanoutRelay, FrameRenderer,
    NoPreview, RelayDispatcher, RelayFeed, RelayStats, SignaturePreview,
};
pub use error::{DeliveryError, MediaError, StreamError, TransportError};
pub use media::{DecodedFrame, FrameDecoder, FrameEncoder, MediaSource, SyntheticSource};
pub use streaming::{
    BroadcastMonitor, BroadcastObserver, BroadcastState, Broadcaster, FramePacer, PublishedFrame,
    StatsHandle, StreamStats, Viewer, ViewerCallbacks, ViewerState,
};
pub use transport::{LocalMesh, LocalNode, Message, PeerId, Subscription, Topic, Transport};
