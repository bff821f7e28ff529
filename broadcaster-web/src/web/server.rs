use super::handlers::AppState;
use anyhow::Result;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct WebServer {
    addr: SocketAddr,
    state: AppState,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// 运行到 `shutdown` 被取消
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let app = super::routes::create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Web server listening on http://{}", self.addr);
        info!("🌐 Web viewer available at http://{}/", self.addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Web server stopped");
        Ok(())
    }
}
