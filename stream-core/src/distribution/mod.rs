// 二级分发：面向浏览器等消费者的有界扇出

pub mod consumer;
pub mod relay;
pub mod render;

pub use consumer::{ChannelConsumer, ConsumerId, ConsumerSink};
pub use relay::{EnqueueOutcome, FanoutRelay, RelayDispatcher, RelayFeed, RelayStats};
pub use render::{FrameRenderer, NoPreview, SignaturePreview};
