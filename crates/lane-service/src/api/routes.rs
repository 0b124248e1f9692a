use crate::publisher::{mjpeg_content_type, mjpeg_stream};
use crate::route::{PositionOutcome, SubmitOutcome};
use crate::state::LaneServiceState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::geo::GeoPoint;
use serde_json::json;

/// Submit the planned route (first call only)
pub async fn build_path(
    State(state): State<LaneServiceState>,
    Json(points): Json<Vec<GeoPoint>>,
) -> impl IntoResponse {
    match state.submit_route(&points).await {
        SubmitOutcome::Accepted { matched, activated } => {
            tracing::info!(points = points.len(), matched, activated, "route submitted");
        }
        SubmitOutcome::AlreadySubmitted => {
            tracing::debug!("route already submitted, ignoring");
        }
    }
    StatusCode::OK
}

/// Operator position update; rotates the window at the head camera
pub async fn update_position(
    State(state): State<LaneServiceState>,
    Json(point): Json<GeoPoint>,
) -> impl IntoResponse {
    if let PositionOutcome::Rotated { released, activated } =
        state.update_position(&point).await
    {
        tracing::info!(released = %released, activated = ?activated, "operator passed camera");
    }
    StatusCode::OK
}

pub async fn camera1(State(state): State<LaneServiceState>) -> Response {
    stream_position(state, 0)
}

pub async fn camera2(State(state): State<LaneServiceState>) -> Response {
    stream_position(state, 1)
}

pub async fn camera3(State(state): State<LaneServiceState>) -> Response {
    stream_position(state, 2)
}

fn stream_position(state: LaneServiceState, position: usize) -> Response {
    let stream = mjpeg_stream(
        state.publisher().clone(),
        position,
        state.config().stream_interval(),
        state.streams_closed().clone(),
    );
    (
        [
            (header::CONTENT_TYPE, mjpeg_content_type()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// One flag per head-camera lane, true for the fastest lanes
pub async fn optimal_lanes(State(state): State<LaneServiceState>) -> impl IntoResponse {
    Json(state.optimal_lanes().await)
}

/// Congestion trend across the three active cameras, or empty
pub async fn alert(State(state): State<LaneServiceState>) -> impl IntoResponse {
    state.alert().await
}

pub async fn lane_status(State(state): State<LaneServiceState>) -> impl IntoResponse {
    state.lane_status().await
}

pub async fn window(State(state): State<LaneServiceState>) -> impl IntoResponse {
    Json(state.window_status().await)
}

/// Registered detector plugins and their health
pub async fn detectors(State(state): State<LaneServiceState>) -> impl IntoResponse {
    let detectors = state.plugins().list().await;
    let health = state.plugins().health_check_all().await;
    Json(json!({
        "active": state.detector_id(),
        "detectors": detectors,
        "health": health,
    }))
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lane-service",
            "version": common::VERSION,
        })),
    )
}

/// Ready once the active detector reports healthy
pub async fn readyz(State(state): State<LaneServiceState>) -> impl IntoResponse {
    let ready = state.detector_ready().await;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not ready" },
            "detector": state.detector_id(),
        })),
    )
}

/// Prometheus metrics endpoint
pub async fn metrics() -> Response {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}
