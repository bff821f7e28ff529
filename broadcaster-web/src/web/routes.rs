use super::handlers::{self, AppState};
use super::sse;
use axum::{
    routing::{get, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // 浏览器观看页
        .route("/", get(handlers::viewer_page))
        // 推流控制
        .route("/api/v1/stats", get(handlers::get_stats))
        .route("/api/v1/quality", put(handlers::set_quality))
        // 浏览器帧推送
        .route("/api/v1/frames", get(sse::stream_frames))
        // 健康检查
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
