mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use vantage_client::{
    H264FileSource, IceServerConfig, MediaSource, MetricsRecorder, MetricsSink,
    RemoteTrackCallback, Role, Session, SessionConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::parse_args()?;
    info!(
        role = ?args.role,
        room = %args.room,
        server_url = %args.server_url,
        "Starting vantage-client"
    );

    let mut config = SessionConfig::new(args.server_url, args.room, args.role);
    config.grace_period = Duration::from_millis(args.grace_ms);
    config.telemetry_interval = Duration::from_millis(args.telemetry_interval_ms);
    if !args.stun_urls.is_empty() {
        config.ice_servers = vec![IceServerConfig {
            urls: args.stun_urls,
            ..Default::default()
        }];
    }

    let media: Option<Box<dyn MediaSource>> = match args.role {
        Role::Publisher => {
            let path = args
                .media
                .context("--media is required for the publisher role")?;
            Some(Box::new(H264FileSource::new(path, args.framerate)))
        }
        Role::Viewer => None,
    };

    let recorder = Arc::new(MetricsRecorder::new());
    let metrics: Option<Arc<dyn MetricsSink>> = match args.role {
        Role::Viewer => Some(Arc::clone(&recorder) as Arc<dyn MetricsSink>),
        Role::Publisher => None,
    };
    // Rendering and detection live outside the core; the binary just logs
    // the hand-off.
    let on_remote_track: Option<RemoteTrackCallback> = match args.role {
        Role::Viewer => Some(Arc::new(|track| {
            info!(kind = %track.kind(), id = %track.id(), "Remote stream available");
        })),
        Role::Publisher => None,
    };

    let mut handle = Session::start(config, media, on_remote_track, metrics)
        .await
        .context("Failed to start session")?;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = handle.closed() => {
            info!("Session ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, leaving");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, leaving");
        }
    }

    // Explicit leave is a no-op when the session already tore itself down
    handle.leave();
    handle.closed().await;

    if args.role == Role::Viewer {
        match serde_json::to_string_pretty(&recorder.summary()) {
            Ok(json) => info!("Session summary:\n{json}"),
            Err(e) => warn!("Failed to serialize session summary: {e}"),
        }
    }

    info!("Client shutdown complete");
    Ok(())
}
