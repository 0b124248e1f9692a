pub mod mock_detector;
pub mod registry;
pub mod yolov8_detector;

use anyhow::Result;
use async_trait::async_trait;
use common::detections::{Detection, DetectorInfo};
use image::RgbImage;

/// Object detector consumed by the processing loop
#[async_trait]
pub trait DetectorPlugin: Send + Sync {
    /// Unique plugin identifier (e.g., "yolov8_detector")
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn version(&self) -> &'static str;

    fn info(&self) -> DetectorInfo {
        DetectorInfo {
            id: self.id().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
            version: self.version().to_string(),
            config_schema: self.config_schema(),
            requires_gpu: self.requires_gpu(),
        }
    }

    /// Plugin-specific configuration schema (JSON Schema)
    fn config_schema(&self) -> Option<serde_json::Value> {
        None
    }

    fn requires_gpu(&self) -> bool {
        false
    }

    /// Initialize plugin with configuration
    async fn init(&mut self, config: serde_json::Value) -> Result<()>;

    /// Detect objects in one decoded frame
    async fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>>;

    /// Detect objects in a frame read from `camera_id`. Stateless detectors
    /// ignore the camera.
    async fn detect_for(&self, _camera_id: &str, frame: &RgbImage) -> Result<Vec<Detection>> {
        self.detect(frame).await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
