mod config;
mod web;

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use common::Quality;
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stream_core::{
    BroadcastMonitor, Broadcaster, FanoutRelay, FrameRenderer, LocalMesh, NoPreview, RelayFeed,
    SignaturePreview, SyntheticSource, Transport, Viewer, ViewerCallbacks,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use web::{AppState, WebServer};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn cli() -> Command {
    Command::new("meshlink-broadcaster")
        .version(env!("CARGO_PKG_VERSION"))
        .about("MeshLink live stream broadcaster with browser relay")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to a TOML configuration file"),
        )
        .arg(
            Arg::new("web")
                .short('w')
                .long("web")
                .value_name("PORT")
                .value_parser(clap::value_parser!(u16))
                .help("Web server port (overrides configuration)"),
        )
        .arg(
            Arg::new("quality")
                .short('q')
                .long("quality")
                .value_name("QUALITY")
                .value_parser(["480p", "720p", "1080p"])
                .help("Stream quality (overrides the resolution-derived quality)"),
        )
        .arg(
            Arg::new("monitor")
                .short('m')
                .long("monitor")
                .action(ArgAction::SetTrue)
                .help("Run a local headless viewer on the stream topic"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let matches = cli().get_matches();

    info!("🚀 MeshLink broadcaster starting...");

    // 加载配置
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = Config::load(config_path.as_deref()).await?;
    if let Some(port) = matches.get_one::<u16>("web") {
        config.web.port = *port;
    }
    let quality = match matches.get_one::<String>("quality") {
        Some(quality) => quality.parse::<Quality>()?,
        None => config.quality(),
    };
    info!(
        "✓ Configuration loaded: topic={}, quality={}, {} fps",
        config.network.topic, quality, config.media.frame_rate
    );

    let shutdown = CancellationToken::new();
    let mesh = LocalMesh::new();

    // 浏览器分发
    let renderer: Arc<dyn FrameRenderer> = if config.web.preview {
        Arc::new(SignaturePreview)
    } else {
        Arc::new(NoPreview)
    };
    let relay = FanoutRelay::spawn(config.web.relay_capacity, renderer, shutdown.child_token());
    info!(
        "✓ Relay ready: capacity={}, every {} frames",
        relay.capacity(),
        config.web.frame_stride
    );

    // 广播端
    let transport: Arc<dyn Transport> = Arc::new(mesh.node());
    let source = SyntheticSource::new(
        u64::from(config.media.bitrate_kbps) * 1000,
        config.media.frame_rate,
    );
    let mut broadcaster = Broadcaster::new(
        transport,
        Box::new(source),
        config.broadcast_settings(quality),
    )
    .await?
    .with_observer(Arc::new(RelayFeed::new(relay.clone(), config.web.frame_stride)))
    .with_cancellation(shutdown.child_token());
    broadcaster.start().await?;
    info!("✓ Broadcasting on {}", config.network.topic);

    let monitor = broadcaster.monitor();
    let broadcaster = Arc::new(Mutex::new(broadcaster));

    // 本地回环观看端
    let mut viewer = if matches.get_flag("monitor") {
        Some(start_monitor_viewer(&mesh, &config, shutdown.child_token()).await?)
    } else {
        None
    };

    let stats_task = spawn_stats_logger(monitor.clone(), relay.clone(), shutdown.child_token());

    let state = AppState {
        broadcaster: broadcaster.clone(),
        monitor,
        relay,
        consumer_buffer: config.web.consumer_buffer,
        shutdown: shutdown.clone(),
    };
    let server = WebServer::new(config.web_addr()?, state);
    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run(server_shutdown).await {
            error!("Web server error: {}", e);
        }
    });

    info!("✅ Broadcaster ready! Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    broadcaster.lock().await.stop().await;
    if let Some(viewer) = viewer.as_mut() {
        viewer.stop().await;
    }
    shutdown.cancel();

    if let Err(e) = server_task.await {
        error!("Web server task failed: {}", e);
    }
    if let Err(e) = stats_task.await {
        error!("Stats task failed: {}", e);
    }

    info!("👋 Goodbye");
    Ok(())
}

async fn start_monitor_viewer(
    mesh: &LocalMesh,
    config: &Config,
    cancel: CancellationToken,
) -> Result<Viewer> {
    let transport: Arc<dyn Transport> = Arc::new(mesh.node());
    let callbacks = ViewerCallbacks::new().on_frame(|frame| {
        if frame.frame_id() % 30 == 0 {
            info!(
                "🔁 Monitor received frame {} ({} bytes, {})",
                frame.frame_id(),
                frame.size(),
                frame.quality()
            );
        } else {
            debug!("Monitor received frame {}", frame.frame_id());
        }
    });

    let mut viewer = Viewer::new(transport, config.viewer_settings(), callbacks)
        .await?
        .with_cancellation(cancel);
    viewer.start_viewing().await?;
    info!("✓ Monitor viewer subscribed to {}", viewer.topic());
    Ok(viewer)
}

fn spawn_stats_logger(
    monitor: BroadcastMonitor,
    relay: FanoutRelay,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_LOG_INTERVAL);
        // 第一次 tick 立即返回，跳过
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let stats = monitor.stats().await;
            let p2p = monitor.viewer_count();
            let web = relay.consumer_count();
            info!(
                "📊 Streaming: {} | Viewers: {} (P2P: {}, Web: {}) | Frames: {} | {:.2} Mbps",
                stats.active,
                p2p + web,
                p2p,
                web,
                stats.frames,
                stats.throughput_mbps()
            );
        }
    })
}
