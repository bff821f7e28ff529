// 浏览器帧推送（Server-Sent Events）
//
// 每个连接注册一个 `ChannelConsumer`，连接关闭（流被释放）时自动注销。

use super::handlers::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use common::FanoutMessage;
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use stream_core::{ChannelConsumer, ConsumerId, FanoutRelay};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

/// 随 SSE 流一起释放，负责从 relay 注销消费者
struct ConsumerGuard {
    relay: FanoutRelay,
    id: ConsumerId,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.relay.deregister_consumer(&self.id);
    }
}

/// 订阅帧事件
pub async fn stream_frames(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (consumer, receiver) = ChannelConsumer::channel(state.consumer_buffer);
    let id = state.relay.register_consumer(Arc::new(consumer));
    debug!("SSE consumer {} connected", id);

    let guard = ConsumerGuard {
        relay: state.relay.clone(),
        id,
    };
    let shutdown = state.shutdown.clone();
    let stream = create_sse_stream(receiver, guard)
        .take_until(async move { shutdown.cancelled().await });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn create_sse_stream(
    receiver: mpsc::Receiver<Arc<FanoutMessage>>,
    guard: ConsumerGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    ReceiverStream::new(receiver).filter_map(move |message| {
        let _guard = &guard;
        let event = match serde_json::to_string(message.as_ref()) {
            Ok(json) => Some(Ok(Event::default().event("frame").data(json))),
            Err(e) => {
                error!("Failed to serialize frame {}: {}", message.frame, e);
                None
            }
        };
        async move { event }
    })
}
