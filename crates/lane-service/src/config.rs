use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LaneServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Camera catalog JSON file
    pub catalog_path: PathBuf,

    /// Directory holding one media file per camera id
    pub video_dir: PathBuf,
    pub video_extension: String,

    /// Id of the detector plugin that drives the processing loop
    pub detector: String,

    /// Plugin-specific JSON handed to the detector's `init`
    pub detector_config: serde_json::Value,

    /// Only detections of this class are tracked
    pub tracked_class: String,

    pub tracking: TrackingConfig,
    pub alerts: AlertConfig,

    /// Processing loop tick period
    pub process_interval: Duration,

    /// MJPEG output pacing
    pub stream_fps: u32,

    pub jpeg_quality: u8,
}

/// Thresholds used while turning detections into lane crossings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingConfig {
    /// Planar lat/lon distance under which a point matches a camera
    pub route_tolerance: f64,

    /// Pixel distance under which a detection keeps its previous identity
    pub track_distance_threshold: f64,

    /// Source frame rate, converts frame counts into seconds
    pub source_fps: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            route_tolerance: 1e-2,
            track_distance_threshold: 15.0,
            source_fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertConfig {
    pub epsilon: f64,
    pub obstructed_threshold: f64,
    pub clear_percentile: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            obstructed_threshold: 0.35,
            clear_percentile: 75.0,
        }
    }
}

impl Default for LaneServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5001".to_string(),
            catalog_path: PathBuf::from("camera_metadata.json"),
            video_dir: PathBuf::from("videos"),
            video_extension: "ts".to_string(),
            detector: "yolov8_detector".to_string(),
            detector_config: serde_json::Value::Null,
            tracked_class: "car".to_string(),
            tracking: TrackingConfig::default(),
            alerts: AlertConfig::default(),
            process_interval: Duration::from_millis(33),
            stream_fps: 30,
            jpeg_quality: 80,
        }
    }
}

fn parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

impl LaneServiceConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let detector_config = env::var("DETECTOR_CONFIG")
            .ok()
            .map(|raw| serde_json::from_str(&raw).context("invalid DETECTOR_CONFIG"))
            .transpose()?
            .unwrap_or(serde_json::Value::Null);

        let tracking = TrackingConfig {
            route_tolerance: parsed("ROUTE_TOLERANCE", defaults.tracking.route_tolerance)?,
            track_distance_threshold: parsed(
                "TRACK_DISTANCE_THRESHOLD",
                defaults.tracking.track_distance_threshold,
            )?,
            source_fps: parsed("SOURCE_FPS", defaults.tracking.source_fps)?,
        };
        if !tracking.source_fps.is_finite() || tracking.source_fps <= 0.0 {
            anyhow::bail!("SOURCE_FPS must be a positive number");
        }
        if !tracking.route_tolerance.is_finite() || tracking.route_tolerance < 0.0 {
            anyhow::bail!("ROUTE_TOLERANCE must be a non-negative number");
        }
        if !tracking.track_distance_threshold.is_finite()
            || tracking.track_distance_threshold < 0.0
        {
            anyhow::bail!("TRACK_DISTANCE_THRESHOLD must be a non-negative number");
        }

        let alerts = AlertConfig {
            epsilon: parsed("ALERT_EPSILON", defaults.alerts.epsilon)?,
            obstructed_threshold: parsed(
                "OBSTRUCTED_THRESHOLD",
                defaults.alerts.obstructed_threshold,
            )?,
            clear_percentile: parsed("CLEAR_PERCENTILE", defaults.alerts.clear_percentile)?,
        };
        if !(0.0..=100.0).contains(&alerts.clear_percentile) {
            anyhow::bail!("CLEAR_PERCENTILE must be within 0..=100");
        }

        let stream_fps: u32 = parsed("STREAM_FPS", defaults.stream_fps)?;
        if stream_fps == 0 {
            anyhow::bail!("STREAM_FPS must be at least 1");
        }

        let process_interval_ms: u64 = parsed(
            "PROCESS_INTERVAL_MS",
            defaults.process_interval.as_millis() as u64,
        )?;
        if process_interval_ms == 0 {
            anyhow::bail!("PROCESS_INTERVAL_MS must be at least 1");
        }

        Ok(Self {
            bind_addr: env::var("LANE_SERVICE_ADDR").unwrap_or(defaults.bind_addr),
            catalog_path: env::var("CAMERA_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.catalog_path),
            video_dir: env::var("VIDEO_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.video_dir),
            video_extension: env::var("VIDEO_EXTENSION").unwrap_or(defaults.video_extension),
            detector: env::var("DETECTOR_PLUGIN").unwrap_or(defaults.detector),
            detector_config,
            tracked_class: env::var("TRACKED_CLASS").unwrap_or(defaults.tracked_class),
            tracking,
            alerts,
            process_interval: Duration::from_millis(process_interval_ms),
            stream_fps,
            jpeg_quality: parsed::<u8>("JPEG_QUALITY", defaults.jpeg_quality)?.clamp(1, 100),
        })
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.stream_fps.max(1) as f64)
    }
}
