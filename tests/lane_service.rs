//! End-to-end tests for the lane service: route submission, the processing
//! loop and the HTTP surface, driven with scripted frames and detections.

use anyhow::Result;
use async_trait::async_trait;
use common::catalog::CameraCatalog;
use common::detections::{BoundingBox, Detection};
use image::{Rgb, RgbImage};
use lane_service::plugin::registry::SharedDetector;
use lane_service::plugin::DetectorPlugin;
use lane_service::processor::TickOutcome;
use lane_service::source::{FrameSource, FrameSourceFactory};
use lane_service::{api, FrameProcessor, LaneServiceConfig, LaneServiceState, PluginRegistry};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const FRAME_WIDTH: u32 = 200;
const FRAME_HEIGHT: u32 = 100;

/// Four cameras on a north-bound line, two lanes each. Exit masks cover the
/// top half of the frame, entry masks the bottom half.
fn catalog() -> CameraCatalog {
    let lane = |x0: f64, x1: f64, y0: f64, y1: f64| json!([[x0, y0], [x1, y0], [x1, y1], [x0, y1]]);
    let cameras: serde_json::Map<String, Value> = (0..4)
        .map(|i| {
            (
                format!("cam{}", i),
                json!({
                    "latitude": i as f64,
                    "longitude": 0.0,
                    "average_speed": [20.0, 20.0],
                    "mask1": [lane(0.0, 100.0, 0.0, 50.0), lane(100.0, 200.0, 0.0, 50.0)],
                    "mask2": [lane(0.0, 100.0, 50.0, 100.0), lane(100.0, 200.0, 50.0, 100.0)],
                }),
            )
        })
        .collect();
    CameraCatalog::from_json(&Value::Object(cameras).to_string()).unwrap()
}

/// Frames carry their own index and the camera's vehicle speed in pixel (0, 0)
struct ScriptedSource {
    speed: u8,
    next: u8,
    len: u8,
    fail: bool,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.fail {
            anyhow::bail!("decoder crashed");
        }
        if self.next >= self.len {
            return Ok(None);
        }
        let mut frame = RgbImage::new(FRAME_WIDTH, FRAME_HEIGHT);
        frame.put_pixel(0, 0, Rgb([self.next, self.speed, 0]));
        self.next += 1;
        Ok(Some(frame))
    }
}

struct ScriptedSources {
    speeds: HashMap<&'static str, u8>,
    broken: Vec<&'static str>,
    frames: u8,
}

impl ScriptedSources {
    fn new(frames: u8) -> Self {
        Self {
            speeds: [("cam0", 10), ("cam1", 5), ("cam2", 3), ("cam3", 5)]
                .into_iter()
                .collect(),
            broken: vec![],
            frames,
        }
    }
}

impl FrameSourceFactory for ScriptedSources {
    fn open(&self, camera_id: &str) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(ScriptedSource {
            speed: self.speeds.get(camera_id).copied().unwrap_or(0),
            next: 0,
            len: self.frames,
            fail: self.broken.contains(&camera_id),
        }))
    }
}

/// One car driving up lane 1 at the frame's speed, plus a parked truck in
/// lane 2 that must be ignored. A speed of zero makes detection fail.
struct ScriptedDetector;

#[async_trait]
impl DetectorPlugin for ScriptedDetector {
    fn id(&self) -> &'static str {
        "scripted_detector"
    }

    fn name(&self) -> &'static str {
        "Scripted Detector"
    }

    fn description(&self) -> &'static str {
        "Reads its detections from the frame"
    }

    fn version(&self) -> &'static str {
        "0.0.1"
    }

    async fn init(&mut self, _config: Value) -> Result<()> {
        Ok(())
    }

    async fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let Rgb([index, speed, _]) = *frame.get_pixel(0, 0);
        if speed == 0 {
            anyhow::bail!("model exploded");
        }

        let mut detections = vec![Detection {
            class: "truck".into(),
            confidence: 0.8,
            bbox: BoundingBox {
                x: 140,
                y: 70,
                width: 20,
                height: 10,
            },
        }];

        // ground point starts at y = 80 and climbs `speed` px per frame
        let ground = 80i32 - speed as i32 * index as i32;
        if ground > 10 {
            detections.push(Detection {
                class: "car".into(),
                confidence: 0.9,
                bbox: BoundingBox {
                    x: 40,
                    y: (ground - 10) as u32,
                    width: 20,
                    height: 10,
                },
            });
        }
        Ok(detections)
    }
}

fn setup_with(sources: ScriptedSources) -> (axum_test::TestServer, LaneServiceState) {
    let registry = PluginRegistry::new();
    let detector: SharedDetector = Arc::new(RwLock::new(ScriptedDetector));
    let config = LaneServiceConfig {
        detector: "scripted_detector".to_string(),
        ..LaneServiceConfig::default()
    };

    let state = LaneServiceState::new(
        config,
        Arc::new(catalog()),
        Arc::new(sources),
        registry,
        detector,
    );
    let server = axum_test::TestServer::new(api::router(state.clone())).unwrap();
    (server, state)
}

async fn setup() -> (axum_test::TestServer, LaneServiceState) {
    let (server, state) = setup_with(ScriptedSources::new(30));
    state
        .plugins()
        .register(state.detector().clone())
        .await
        .unwrap();
    (server, state)
}

fn route() -> Value {
    json!([
        {"latitude": 0.0, "longitude": 0.0},
        {"latitude": 0.5, "longitude": 0.0},
        {"latitude": 1.0, "longitude": 0.001},
        {"latitude": 1.0, "longitude": 0.002},
        {"latitude": 2.0, "longitude": 0.0},
        {"latitude": 3.0, "longitude": 0.0}
    ])
}

async fn run_ticks(state: &LaneServiceState, ticks: usize) -> Vec<Vec<TickOutcome>> {
    let processor = FrameProcessor::new(state.clone());
    let mut outcomes = Vec::new();
    for _ in 0..ticks {
        outcomes.push(processor.tick().await);
    }
    outcomes
}

fn window_ids(window: &Value) -> Vec<String> {
    window["cameras"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["camera_id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_build_path_fills_window() {
    let (server, _state) = setup().await;

    let response = server.post("/api/build-path").json(&route()).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.text(), "");

    let window: Value = server.get("/api/window").await.json();
    assert_eq!(window["submitted"], true);
    assert_eq!(window_ids(&window), vec!["cam0", "cam1", "cam2"]);
    assert_eq!(window["queued"], json!(["cam3"]));
}

#[tokio::test]
async fn test_build_path_is_one_shot() {
    let (server, _state) = setup().await;

    server
        .post("/api/build-path")
        .json(&json!([{"latitude": 3.0, "longitude": 0.0}]))
        .await;
    let response = server.post("/api/build-path").json(&route()).await;
    assert_eq!(response.status_code(), 200);

    let window: Value = server.get("/api/window").await.json();
    assert_eq!(window_ids(&window), vec!["cam3"]);
    assert_eq!(window["queued"], json!([]));
}

#[tokio::test]
async fn test_malformed_route_is_rejected() {
    let (server, _state) = setup().await;

    let response = server
        .post("/api/build-path")
        .json(&json!({"latitude": "north"}))
        .await;
    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_queries_degrade_to_empty_without_route() {
    let (server, _state) = setup().await;

    let lanes: Vec<bool> = server.get("/api/get-optimal-lanes").await.json();
    assert!(lanes.is_empty());
    assert_eq!(server.get("/api/get-alert").await.text(), "");
    assert_eq!(server.get("/api/lane-status").await.text(), "");

    let response = server
        .put("/api/update")
        .json(&json!({"latitude": 0.0, "longitude": 0.0}))
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_crossings_accumulate_per_lane() {
    let (server, state) = setup().await;
    server.post("/api/build-path").json(&route()).await;

    let outcomes = run_ticks(&state, 12).await;
    assert!(outcomes
        .iter()
        .flatten()
        .all(|outcome| *outcome == TickOutcome::Processed));

    let window: Value = server.get("/api/window").await.json();
    let head = &window["cameras"][0];
    assert_eq!(head["frame_index"], 12);
    assert_eq!(head["lanes"][0]["crossings"], 1);
    assert_eq!(head["lanes"][0]["mean_frames"], 3.0);
    assert_eq!(head["lanes"][0]["score"], 10.0);
    // the truck is never tracked
    assert_eq!(head["lanes"][1]["crossings"], 0);
    assert_eq!(head["lanes"][1]["score"], 0.0);

    assert_eq!(window["cameras"][1]["lanes"][0]["mean_frames"], 6.0);
    assert_eq!(window["cameras"][2]["lanes"][0]["mean_frames"], 10.0);

    let lanes: Vec<bool> = server.get("/api/get-optimal-lanes").await.json();
    assert_eq!(lanes, vec![true, false]);

    // head 10/s, middle 5/s, tail 3/s
    assert_eq!(
        server.get("/api/get-alert").await.text(),
        "Traffic building up ahead."
    );
    assert_eq!(
        server.get("/api/lane-status").await.text(),
        "Lane 1 is clear; Lane 2 is obstructed."
    );
}

#[tokio::test]
async fn test_frames_are_published_per_slot() {
    let (server, state) = setup().await;
    server.post("/api/build-path").json(&route()).await;

    assert!(state.publisher().latest(0).await.is_none());
    run_ticks(&state, 1).await;

    for position in 0..3 {
        let jpeg = state.publisher().latest(position).await.unwrap();
        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);
    }
}

#[tokio::test]
async fn test_position_update_rotates_window() {
    let (server, state) = setup().await;
    server.post("/api/build-path").json(&route()).await;
    run_ticks(&state, 12).await;

    // not at the head camera: nothing changes
    server
        .put("/api/update")
        .json(&json!({"latitude": 1.0, "longitude": 0.0}))
        .await;
    let window: Value = server.get("/api/window").await.json();
    assert_eq!(window_ids(&window), vec!["cam0", "cam1", "cam2"]);

    let response = server
        .put("/api/update")
        .json(&json!({"latitude": 0.0, "longitude": 0.005}))
        .await;
    assert_eq!(response.status_code(), 200);

    let window: Value = server.get("/api/window").await.json();
    assert_eq!(window_ids(&window), vec!["cam1", "cam2", "cam3"]);
    assert_eq!(window["queued"], json!([]));
    // the new tail starts from zero
    assert_eq!(window["cameras"][2]["frame_index"], 0);
    assert!(state.publisher().latest(2).await.is_none());

    // cam3 has no samples yet, so only head and middle compare
    assert_eq!(
        server.get("/api/get-alert").await.text(),
        "Traffic building up ahead."
    );

    // queue exhausted: the window shrinks and processing carries on
    server
        .put("/api/update")
        .json(&json!({"latitude": 1.0, "longitude": 0.0}))
        .await;
    let window: Value = server.get("/api/window").await.json();
    assert_eq!(window_ids(&window), vec!["cam2", "cam3"]);
    assert_eq!(server.get("/api/get-alert").await.text(), "");

    let outcomes = run_ticks(&state, 1).await;
    assert_eq!(outcomes[0].len(), 2);
}

#[tokio::test]
async fn test_faulty_camera_does_not_stop_others() {
    let mut sources = ScriptedSources::new(2);
    sources.broken.push("cam1");
    sources.speeds.insert("cam2", 0);
    let (server, state) = setup_with(sources);
    server.post("/api/build-path").json(&route()).await;

    let outcomes = run_ticks(&state, 3).await;
    assert_eq!(
        outcomes[0],
        vec![
            TickOutcome::Processed,
            TickOutcome::SourceFault,
            TickOutcome::DetectionFault
        ]
    );
    // sources hold two frames; the third tick sees end of stream once
    assert_eq!(
        outcomes[2],
        vec![
            TickOutcome::SourceFault,
            TickOutcome::SourceFault,
            TickOutcome::SourceFault
        ]
    );
    let outcomes = run_ticks(&state, 1).await;
    assert_eq!(
        outcomes[0],
        vec![
            TickOutcome::Exhausted,
            TickOutcome::SourceFault,
            TickOutcome::Exhausted
        ]
    );

    let window: Value = server.get("/api/window").await.json();
    assert_eq!(window["cameras"][0]["frame_index"], 2);
    assert_eq!(window["cameras"][1]["frame_index"], 0);
    // detection failures still consume the frame and publish it
    assert_eq!(window["cameras"][2]["frame_index"], 2);
    assert!(state.publisher().latest(2).await.is_some());
    assert!(state.publisher().latest(1).await.is_none());
}

#[tokio::test]
async fn test_health_ready_and_metrics() {
    let (server, state) = setup().await;
    server.post("/api/build-path").json(&route()).await;
    run_ticks(&state, 1).await;

    let health: Value = server.get("/healthz").await.json();
    assert_eq!(health["status"], "healthy");

    let ready = server.get("/readyz").await;
    assert_eq!(ready.status_code(), 200);

    let detectors: Value = server.get("/api/detectors").await.json();
    assert_eq!(detectors["active"], "scripted_detector");
    assert_eq!(detectors["detectors"][0]["id"], "scripted_detector");
    assert_eq!(detectors["health"]["scripted_detector"], true);

    let metrics = server.get("/metrics").await.text();
    assert!(metrics.contains("lane_frames_processed_total"));
    assert!(metrics.contains("lane_active_cameras"));
}

#[tokio::test]
async fn test_camera_stream_serves_mjpeg_until_closed() {
    let (server, state) = setup().await;
    server.post("/api/build-path").json(&route()).await;
    run_ticks(&state, 1).await;
    let jpeg = state.publisher().latest(0).await.unwrap();

    let (response, _) = tokio::join!(async { server.get("/api/camera1").await }, async {
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        state.close_streams();
    });

    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.header("content-type"),
        "multipart/x-mixed-replace; boundary=frame"
    );

    let body = response.as_bytes();
    let head = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    assert!(body.starts_with(head));
    assert_eq!(&body[head.len()..head.len() + jpeg.len()], &jpeg[..]);
    assert_eq!(&body[head.len() + jpeg.len()..head.len() + jpeg.len() + 2], b"\r\n");
}
