use anyhow::{Context, Result};
use common::catalog::CameraCatalog;
use lane_service::{
    api,
    plugin::{mock_detector::MockDetectorPlugin, yolov8_detector::YoloV8DetectorPlugin},
    source::FfmpegSourceFactory,
    FrameProcessor, LaneServiceConfig, LaneServiceState, PluginRegistry,
};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Held for the process lifetime so buffered file logs are flushed
    let _log_guard = telemetry::init_with_service("lane-service");

    info!(version = common::VERSION, "Starting lane service...");

    let config = LaneServiceConfig::from_env()?;
    info!(
        bind = %config.bind_addr,
        catalog = %config.catalog_path.display(),
        videos = %config.video_dir.display(),
        detector = %config.detector,
        tracked_class = %config.tracked_class,
        "lane service configuration"
    );

    let catalog = Arc::new(CameraCatalog::load(&config.catalog_path)?);
    if catalog.is_empty() {
        anyhow::bail!(
            "camera catalog {} contains no cameras",
            config.catalog_path.display()
        );
    }

    // Register built-in detectors, then initialise the selected one
    let registry = PluginRegistry::new();
    registry
        .register(Arc::new(RwLock::new(MockDetectorPlugin::new())))
        .await?;
    registry
        .register(Arc::new(RwLock::new(YoloV8DetectorPlugin::new())))
        .await?;
    info!(plugins = registry.count().await, "detector registry initialized");

    let detector = registry
        .get(&config.detector)
        .await
        .with_context(|| format!("unknown DETECTOR_PLUGIN '{}'", config.detector))?;
    detector
        .write()
        .await
        .init(config.detector_config.clone())
        .await
        .with_context(|| format!("failed to initialise detector '{}'", config.detector))?;

    let sources = Arc::new(FfmpegSourceFactory::new(
        config.video_dir.clone(),
        config.video_extension.clone(),
    ));
    let bind_addr = config.bind_addr.clone();
    let state = LaneServiceState::new(config, catalog, sources, registry, detector);

    let cancel = CancellationToken::new();
    let processing = FrameProcessor::new(state.clone()).spawn(cancel.clone());

    let app = api::router(state.clone());

    info!("Binding to {}", bind_addr);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Lane service listening on {}", bind_addr);

    let draining = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // open streams would otherwise hold the drain forever
            draining.close_streams();
        })
        .await?;

    info!("Shutting down gracefully...");
    cancel.cancel();
    if let Err(e) = processing.await {
        error!("Processing loop ended abnormally: {}", e);
    }
    if let Err(e) = state.shutdown().await {
        error!("Error during shutdown: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
