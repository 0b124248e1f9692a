pub mod routes;

use crate::state::LaneServiceState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn router(state: LaneServiceState) -> Router {
    let api = Router::new()
        // Route and position commands
        .route("/build-path", post(routes::build_path))
        .route("/update", put(routes::update_position))
        // Live MJPEG streams, one per window position
        .route("/camera1", get(routes::camera1))
        .route("/camera2", get(routes::camera2))
        .route("/camera3", get(routes::camera3))
        // Analysis
        .route("/get-optimal-lanes", get(routes::optimal_lanes))
        .route("/get-alert", get(routes::alert))
        .route("/lane-status", get(routes::lane_status))
        .route("/window", get(routes::window))
        .route("/detectors", get(routes::detectors));

    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
