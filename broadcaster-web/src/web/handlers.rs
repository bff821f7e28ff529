use axum::{extract::State, http::StatusCode, response::Html, Json};
use common::{ParseQualityError, Quality};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stream_core::{
    BroadcastMonitor, BroadcastState, Broadcaster, FanoutRelay, RelayStats, StreamError,
    StreamStats,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// HTTP 层共享状态
#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Arc<Mutex<Broadcaster>>,
    pub monitor: BroadcastMonitor,
    pub relay: FanoutRelay,
    /// 每个 SSE 连接的缓冲
    pub consumer_buffer: usize,
    /// 进程退出信号，用于结束长连接
    pub shutdown: CancellationToken,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::error(message)))
}

fn stream_error(err: StreamError) -> ApiError {
    let status = match err {
        StreamError::AlreadyStreaming(_)
        | StreamError::AlreadyViewing(_)
        | StreamError::CannotChangeWhileStreaming => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

const VIEWER_PAGE: &str = include_str!("../../static/viewer.html");

/// 浏览器观看页，消费 `/api/v1/frames`
pub async fn viewer_page() -> Html<&'static str> {
    Html(VIEWER_PAGE)
}

/// 健康检查
pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("OK".to_string()))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub state: BroadcastState,
    pub topic: String,
    pub quality: Quality,
    pub stream: StreamStats,
    pub frame_rate: f64,
    pub throughput_mbps: f64,
    pub p2p_viewers: usize,
    pub web_viewers: usize,
    pub total_viewers: usize,
    pub relay: RelayStats,
}

/// 获取推流统计
pub async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<StatsResponse>> {
    let (broadcast_state, topic, quality) = {
        let broadcaster = state.broadcaster.lock().await;
        (
            broadcaster.state(),
            broadcaster.topic().to_string(),
            broadcaster.quality(),
        )
    };

    let stream = state.monitor.stats().await;
    let p2p_viewers = state.monitor.viewer_count();
    let relay = state.relay.stats();

    Json(ApiResponse::success(StatsResponse {
        state: broadcast_state,
        topic,
        quality,
        frame_rate: stream.frame_rate(),
        throughput_mbps: stream.throughput_mbps(),
        stream,
        p2p_viewers,
        web_viewers: relay.consumers,
        total_viewers: p2p_viewers + relay.consumers,
        relay,
    }))
}

#[derive(Debug, Deserialize)]
pub struct QualityRequest {
    pub quality: String,
}

#[derive(Debug, Serialize)]
pub struct QualityResponse {
    pub quality: Quality,
    pub bitrate: u64,
    pub state: BroadcastState,
}

/// 修改画质：停止 → 修改 → 重新启动（仅当原本在推流）
pub async fn set_quality(
    State(state): State<AppState>,
    Json(request): Json<QualityRequest>,
) -> Result<Json<ApiResponse<QualityResponse>>, ApiError> {
    let quality: Quality = request.quality.parse().map_err(|e: ParseQualityError| {
        warn!("Rejected quality change: {}", e);
        api_error(StatusCode::BAD_REQUEST, e.to_string())
    })?;

    let mut broadcaster = state.broadcaster.lock().await;
    let was_streaming = broadcaster.is_streaming();

    broadcaster.stop().await;
    broadcaster.set_quality(quality).map_err(stream_error)?;
    if was_streaming {
        broadcaster.start().await.map_err(stream_error)?;
    }

    info!("Quality changed to {} via HTTP", quality);
    Ok(Json(ApiResponse::success(QualityResponse {
        quality,
        bitrate: quality.bitrate(),
        state: broadcaster.state(),
    })))
}
