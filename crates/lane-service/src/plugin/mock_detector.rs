/// Synthetic vehicle detector for demos and tests without a model
use super::DetectorPlugin;
use anyhow::{bail, Result};
use async_trait::async_trait;
use common::detections::{BoundingBox, Detection};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockDetectorConfig {
    /// Class reported for every synthetic vehicle
    #[serde(default = "default_class")]
    pub class: String,

    /// Number of evenly spaced columns carrying one vehicle each
    #[serde(default = "default_columns")]
    pub columns: u32,

    /// Pixels a vehicle moves down per frame of the same camera
    #[serde(default = "default_step")]
    pub step_px: u32,

    /// Square box side in pixels
    #[serde(default = "default_box_size")]
    pub box_size: u32,

    /// Simulate processing delay in milliseconds
    #[serde(default)]
    pub simulated_delay_ms: u64,
}

fn default_class() -> String {
    "car".to_string()
}

fn default_columns() -> u32 {
    3
}

fn default_step() -> u32 {
    4
}

fn default_box_size() -> u32 {
    40
}

impl Default for MockDetectorConfig {
    fn default() -> Self {
        Self {
            class: default_class(),
            columns: default_columns(),
            step_px: default_step(),
            box_size: default_box_size(),
            simulated_delay_ms: 0,
        }
    }
}

pub struct MockDetectorPlugin {
    config: MockDetectorConfig,
    /// Frames seen per camera; each camera's traffic advances on its own
    frames: Mutex<HashMap<String, u64>>,
}

impl MockDetectorPlugin {
    pub fn new() -> Self {
        Self {
            config: MockDetectorConfig::default(),
            frames: Mutex::new(HashMap::new()),
        }
    }

    fn next_phase(&self, camera_id: &str) -> u64 {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        let seen = frames.entry(camera_id.to_string()).or_insert(0);
        let phase = *seen;
        *seen += 1;
        phase
    }

    fn vehicles(&self, phase: u64, width: u32, height: u32) -> Vec<Detection> {
        let size = self.config.box_size.min(width).min(height);
        if size == 0 || self.config.columns == 0 {
            return vec![];
        }

        let lane_width = width / self.config.columns;
        let travel = (height - size) as u64 + 1;

        (0..self.config.columns)
            .map(|column| {
                // stagger columns so vehicles don't move in lockstep
                let offset = column as u64 * travel / self.config.columns as u64;
                let y = ((phase * self.config.step_px as u64 + offset) % travel) as u32;
                let x = (column * lane_width + lane_width / 2).saturating_sub(size / 2);

                Detection {
                    class: self.config.class.clone(),
                    confidence: 0.9,
                    bbox: BoundingBox {
                        x: x.min(width - size),
                        y,
                        width: size,
                        height: size,
                    },
                }
            })
            .collect()
    }
}

impl Default for MockDetectorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DetectorPlugin for MockDetectorPlugin {
    fn id(&self) -> &'static str {
        "mock_object_detector"
    }

    fn name(&self) -> &'static str {
        "Mock Object Detector"
    }

    fn description(&self) -> &'static str {
        "Synthetic vehicles moving down evenly spaced columns"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn config_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "class": {"type": "string", "default": "car"},
                "columns": {"type": "integer", "minimum": 1, "default": 3},
                "step_px": {"type": "integer", "minimum": 0, "default": 4},
                "box_size": {"type": "integer", "minimum": 1, "default": 40},
                "simulated_delay_ms": {"type": "integer", "minimum": 0, "default": 0}
            }
        }))
    }

    async fn init(&mut self, config: serde_json::Value) -> Result<()> {
        if !config.is_null() {
            self.config = serde_json::from_value(config)?;
        }
        if self.config.columns == 0 {
            bail!("mock detector needs at least one column");
        }
        tracing::info!(
            columns = self.config.columns,
            class = %self.config.class,
            "Initialized MockDetectorPlugin"
        );
        Ok(())
    }

    async fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        self.detect_for("", frame).await
    }

    async fn detect_for(&self, camera_id: &str, frame: &RgbImage) -> Result<Vec<Detection>> {
        if self.config.simulated_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(
                self.config.simulated_delay_ms,
            ))
            .await;
        }

        let phase = self.next_phase(camera_id);
        Ok(self.vehicles(phase, frame.width(), frame.height()))
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down MockDetectorPlugin");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_detector_init() {
        let mut plugin = MockDetectorPlugin::new();
        plugin
            .init(serde_json::json!({"columns": 2, "class": "truck"}))
            .await
            .unwrap();
        assert_eq!(plugin.config.columns, 2);
        assert_eq!(plugin.config.class, "truck");
        assert_eq!(plugin.config.box_size, 40);
    }

    #[tokio::test]
    async fn test_mock_detector_rejects_zero_columns() {
        let mut plugin = MockDetectorPlugin::new();
        assert!(plugin.init(serde_json::json!({"columns": 0})).await.is_err());
    }

    #[tokio::test]
    async fn test_boxes_stay_inside_frame() {
        let plugin = MockDetectorPlugin::new();
        let frame = RgbImage::new(320, 240);

        for _ in 0..200 {
            let detections = plugin.detect(&frame).await.unwrap();
            assert_eq!(detections.len(), 3);
            for d in detections {
                assert!(d.bbox.x + d.bbox.width <= 320);
                assert!(d.bbox.y + d.bbox.height <= 240);
            }
        }
    }

    #[tokio::test]
    async fn test_vehicles_move_down() {
        let plugin = MockDetectorPlugin::new();
        let frame = RgbImage::new(320, 240);

        let first = plugin.detect(&frame).await.unwrap();
        let second = plugin.detect(&frame).await.unwrap();
        assert_eq!(second[0].bbox.y, first[0].bbox.y + 4);
        assert_eq!(second[0].bbox.x, first[0].bbox.x);
    }

    #[tokio::test]
    async fn test_tiny_frame_yields_nothing() {
        let plugin = MockDetectorPlugin::new();
        let frame = RgbImage::new(0, 0);
        assert!(plugin.detect(&frame).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cameras_move_independently() {
        let plugin = MockDetectorPlugin::new();
        let frame = RgbImage::new(320, 240);

        let a0 = plugin.detect_for("cam-a", &frame).await.unwrap();
        // other cameras in the window must not speed up cam-a
        plugin.detect_for("cam-b", &frame).await.unwrap();
        plugin.detect_for("cam-c", &frame).await.unwrap();
        let a1 = plugin.detect_for("cam-a", &frame).await.unwrap();
        assert_eq!(a1[0].bbox.y, a0[0].bbox.y + 4);

        let b1 = plugin.detect_for("cam-b", &frame).await.unwrap();
        assert_eq!(b1[0].bbox.y, a1[0].bbox.y);
    }
}
