use crate::alert::AlertAnalyzer;
use crate::config::LaneServiceConfig;
use crate::plugin::registry::{PluginRegistry, SharedDetector};
use crate::publisher::FramePublisher;
use crate::route::{CameraSession, PositionOutcome, RouteSession, SubmitOutcome};
use crate::source::FrameSourceFactory;
use anyhow::Result;
use bytes::Bytes;
use common::catalog::CameraCatalog;
use common::geo::GeoPoint;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Clone)]
pub struct LaneServiceState {
    inner: Arc<LaneServiceStateInner>,
}

struct LaneServiceStateInner {
    config: LaneServiceConfig,
    route: Mutex<RouteSession>,
    publisher: Arc<FramePublisher>,
    plugins: PluginRegistry,
    detector_id: String,
    detector: SharedDetector,
    analyzer: AlertAnalyzer,
    streams_closed: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowStatus {
    pub submitted: bool,
    pub cameras: Vec<CameraStatus>,
    pub queued: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraStatus {
    pub position: usize,
    pub camera_id: String,
    pub frame_index: u64,
    pub lanes: Vec<LaneView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaneView {
    /// 1-indexed, as shown to the operator
    pub lane: usize,
    pub crossings: u64,
    pub mean_frames: Option<f64>,
    pub score: f64,
    pub baseline: Option<f64>,
}

impl LaneServiceState {
    pub fn new(
        config: LaneServiceConfig,
        catalog: Arc<CameraCatalog>,
        sources: Arc<dyn FrameSourceFactory>,
        plugins: PluginRegistry,
        detector: SharedDetector,
    ) -> Self {
        let publisher = Arc::new(FramePublisher::new());
        let route = RouteSession::new(
            catalog,
            sources,
            publisher.clone(),
            config.tracking.route_tolerance,
            config.tracking.track_distance_threshold,
        );
        let analyzer = AlertAnalyzer::new(config.alerts, config.tracking.source_fps);

        Self {
            inner: Arc::new(LaneServiceStateInner {
                detector_id: config.detector.clone(),
                config,
                route: Mutex::new(route),
                publisher,
                plugins,
                detector,
                analyzer,
                streams_closed: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &LaneServiceConfig {
        &self.inner.config
    }

    pub fn publisher(&self) -> &Arc<FramePublisher> {
        &self.inner.publisher
    }

    /// Cancelled once the service starts draining; open MJPEG streams end
    pub fn streams_closed(&self) -> &CancellationToken {
        &self.inner.streams_closed
    }

    pub fn close_streams(&self) {
        info!("closing camera streams");
        self.inner.streams_closed.cancel();
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.inner.plugins
    }

    pub fn detector(&self) -> &SharedDetector {
        &self.inner.detector
    }

    pub fn detector_id(&self) -> &str {
        &self.inner.detector_id
    }

    pub async fn submit_route(&self, points: &[GeoPoint]) -> SubmitOutcome {
        self.inner.route.lock().await.submit_route(points)
    }

    pub async fn update_position(&self, point: &GeoPoint) -> PositionOutcome {
        self.inner.route.lock().await.update_position(point).await
    }

    /// Active sessions in window order
    pub async fn sessions(&self) -> Vec<Arc<CameraSession>> {
        self.inner.route.lock().await.snapshot()
    }

    pub async fn head(&self) -> Option<Arc<CameraSession>> {
        self.inner.route.lock().await.head()
    }

    pub async fn publish(&self, session: &CameraSession, jpeg: Bytes) -> bool {
        self.inner.route.lock().await.publish(session, jpeg).await
    }

    pub async fn optimal_lanes(&self) -> Vec<bool> {
        let head = self.head().await;
        self.inner.analyzer.optimal_lanes(head.as_deref())
    }

    pub async fn alert(&self) -> String {
        let sessions = self.sessions().await;
        self.inner.analyzer.trend(&sessions).message().to_string()
    }

    pub async fn lane_status(&self) -> String {
        let head = self.head().await;
        self.inner.analyzer.lane_status(head.as_deref())
    }

    pub async fn window_status(&self) -> WindowStatus {
        let (submitted, sessions, queued) = {
            let route = self.inner.route.lock().await;
            (
                route.is_submitted(),
                route.snapshot(),
                route.queued().map(str::to_string).collect(),
            )
        };

        let fps = self.inner.config.tracking.source_fps;
        let cameras = sessions
            .iter()
            .enumerate()
            .map(|(position, session)| CameraStatus {
                position: position + 1,
                camera_id: session.camera_id().to_string(),
                frame_index: session.frame_index(),
                lanes: session
                    .stats()
                    .snapshot()
                    .iter()
                    .enumerate()
                    .map(|(lane, summary)| LaneView {
                        lane: lane + 1,
                        crossings: summary.crossings,
                        mean_frames: summary.mean_frames(),
                        score: summary.score(fps).unwrap_or(0.0),
                        baseline: session.camera().baseline.get(lane).copied(),
                    })
                    .collect(),
            })
            .collect();

        WindowStatus {
            submitted,
            cameras,
            queued,
        }
    }

    pub async fn detector_ready(&self) -> bool {
        match self.inner.detector.read().await.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                error!(detector = %self.inner.detector_id, error = %e, "detector health check failed");
                false
            }
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down detector plugins");
        self.inner.plugins.shutdown_all().await
    }
}
