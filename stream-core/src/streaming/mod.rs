// 流处理：节拍控制、广播端、观看端与统计

pub mod broadcaster;
pub mod pacer;
pub mod stats;
pub mod viewer;


pub use broadcaster::{
    BroadcastMonitor, BroadcastObserver, BroadcastState, Broadcaster, PublishedFrame,
};
pub use pacer::FramePacer;
pub use stats::{StatsHandle, StreamStats};
pub use viewer::{Viewer, ViewerCallbacks, ViewerState};
