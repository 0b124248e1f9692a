/// YOLOv8 vehicle detector using ONNX Runtime
use super::DetectorPlugin;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::detections::{BoundingBox, Detection};
use image::RgbImage;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
        TensorRTExecutionProvider,
    },
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloV8Config {
    /// Path to the ONNX model file
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Confidence threshold for detections (0.0 to 1.0)
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// IoU threshold for NMS
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Square model input size
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Class names indexed by model output channel (default: COCO)
    #[serde(default = "default_coco_classes")]
    pub class_names: Vec<String>,

    /// Execution provider preference (CPU, CUDA, TensorRT)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    #[serde(default)]
    pub device_id: i32,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_model_path() -> String {
    "models/yolov8n.onnx".to_string()
}

fn default_confidence() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    100
}

fn default_input_size() -> u32 {
    640
}

fn default_coco_classes() -> Vec<String> {
    [
        "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
        "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
        "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
        "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
        "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
        "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
        "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
        "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
        "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
        "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
        "toothbrush",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_execution_provider() -> String {
    "CUDA".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for YoloV8Config {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            input_size: default_input_size(),
            class_names: default_coco_classes(),
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

type Candidate = (BoundingBox, f32, usize);

pub struct YoloV8DetectorPlugin {
    config: YoloV8Config,
    session: Option<Mutex<Session>>,
    provider: String,
}

impl YoloV8DetectorPlugin {
    pub fn new() -> Self {
        Self {
            config: YoloV8Config::default(),
            session: None,
            provider: "CPU".to_string(),
        }
    }

    /// Provider chains to try, most capable first
    fn provider_attempts(&self) -> Vec<(&'static str, Vec<ExecutionProviderDispatch>)> {
        let device = self.config.device_id;
        let cuda = || CUDAExecutionProvider::default().with_device_id(device).build();
        let cpu = || CPUExecutionProvider::default().build();

        let mut attempts = Vec::new();
        match self.config.execution_provider.to_uppercase().as_str() {
            "TENSORRT" => {
                attempts.push((
                    "TensorRT",
                    vec![
                        TensorRTExecutionProvider::default()
                            .with_device_id(device)
                            .build(),
                        cuda(),
                        cpu(),
                    ],
                ));
                attempts.push(("CUDA", vec![cuda(), cpu()]));
            }
            "CUDA" => attempts.push(("CUDA", vec![cuda(), cpu()])),
            _ => {}
        }
        attempts.push(("CPU", vec![]));
        attempts
    }

    fn build_session(&self, providers: Vec<ExecutionProviderDispatch>) -> Result<Session> {
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.config.intra_threads)?
            .with_inter_threads(self.config.inter_threads)?;
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers)?;
        }
        Ok(builder.commit_from_file(&self.config.model_path)?)
    }

    /// Resize to the square model input, NCHW, normalized to [0, 1]
    fn preprocess(&self, frame: &RgbImage) -> Array<f32, IxDyn> {
        let size = self.config.input_size;
        let resized =
            image::imageops::resize(frame, size, size, image::imageops::FilterType::Triangle);

        let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                input[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
            }
        }
        input
    }

    fn infer(&self, frame: &RgbImage) -> Result<(Vec<Detection>, Duration)> {
        let session = self
            .session
            .as_ref()
            .context("Model not initialized - call init() first")?;

        let input_tensor = Value::from_array(self.preprocess(frame))?;

        let started = Instant::now();
        let mut session = session
            .lock()
            .map_err(|e| anyhow!("Failed to lock session: {}", e))?;
        let outputs = session.run(ort::inputs![input_tensor])?;
        let inference_time = started.elapsed();

        let output_value = outputs.get("output0").context("No output tensor found")?;
        let (shape, data) = output_value.try_extract_tensor::<f32>()?;
        let shape: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape), data.to_vec())?;

        let detections = self.postprocess(&output, frame.width(), frame.height())?;
        Ok((detections, inference_time))
    }

    /// Decode `[1, 4 + classes, predictions]` output into frame-space detections
    fn postprocess(
        &self,
        output: &Array<f32, IxDyn>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Vec<Detection>> {
        let dims = output.shape();
        if dims.len() != 3 || dims[1] <= 4 {
            return Err(anyhow!("unexpected YOLOv8 output shape {:?}", dims));
        }
        let num_classes = dims[1] - 4;
        let num_predictions = dims[2];

        let scale_x = frame_width as f32 / self.config.input_size as f32;
        let scale_y = frame_height as f32 / self.config.input_size as f32;

        let mut candidates = Vec::new();
        for i in 0..num_predictions {
            let (class_idx, score) = (0..num_classes)
                .map(|c| (c, output[[0, 4 + c, i]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if score < self.config.confidence_threshold {
                continue;
            }

            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let w = output[[0, 2, i]];
            let h = output[[0, 3, i]];

            let x = ((cx - w / 2.0) * scale_x).clamp(0.0, frame_width as f32) as u32;
            let y = ((cy - h / 2.0) * scale_y).clamp(0.0, frame_height as f32) as u32;
            let width = ((w * scale_x) as u32).min(frame_width - x);
            let height = ((h * scale_y) as u32).min(frame_height - y);

            candidates.push((
                BoundingBox {
                    x,
                    y,
                    width,
                    height,
                },
                score,
                class_idx,
            ));
        }

        Ok(self
            .nms(candidates)
            .into_iter()
            .take(self.config.max_detections)
            .map(|(bbox, confidence, class_idx)| Detection {
                class: self
                    .config
                    .class_names
                    .get(class_idx)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", class_idx)),
                confidence,
                bbox,
            })
            .collect())
    }

    /// Greedy per-class-agnostic Non-Maximum Suppression
    fn nms(&self, mut boxes: Vec<Candidate>) -> Vec<Candidate> {
        boxes.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut keep: Vec<Candidate> = Vec::new();
        for candidate in boxes {
            if keep
                .iter()
                .all(|kept| iou(&kept.0, &candidate.0) < self.config.iou_threshold)
            {
                keep.push(candidate);
            }
        }
        keep
    }
}

/// Intersection over Union of two boxes
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = if x2 > x1 && y2 > y1 {
        ((x2 - x1) * (y2 - y1)) as f32
    } else {
        0.0
    };

    let union = (a.width * a.height) as f32 + (b.width * b.height) as f32 - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

impl Default for YoloV8DetectorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DetectorPlugin for YoloV8DetectorPlugin {
    fn id(&self) -> &'static str {
        "yolov8_detector"
    }

    fn name(&self) -> &'static str {
        "YOLOv8 Object Detector"
    }

    fn description(&self) -> &'static str {
        "Real-time vehicle detection using a YOLOv8 ONNX model"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn config_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "model_path": {"type": "string", "default": "models/yolov8n.onnx"},
                "confidence_threshold": {"type": "number", "minimum": 0.0, "maximum": 1.0, "default": 0.25},
                "iou_threshold": {"type": "number", "minimum": 0.0, "maximum": 1.0, "default": 0.45},
                "max_detections": {"type": "integer", "minimum": 1, "default": 100},
                "input_size": {"type": "integer", "default": 640},
                "class_names": {"type": "array", "items": {"type": "string"}},
                "execution_provider": {"type": "string", "enum": ["CPU", "CUDA", "TensorRT"], "default": "CUDA"},
                "device_id": {"type": "integer", "minimum": 0, "default": 0},
                "intra_threads": {"type": "integer", "minimum": 1, "default": 4},
                "inter_threads": {"type": "integer", "minimum": 1, "default": 1}
            }
        }))
    }

    async fn init(&mut self, config: serde_json::Value) -> Result<()> {
        if !config.is_null() {
            self.config = serde_json::from_value(config)?;
        }

        if let Ok(path) = std::env::var("YOLOV8_MODEL_PATH") {
            self.config.model_path = path;
        }
        if let Ok(provider) = std::env::var("YOLOV8_EXECUTION_PROVIDER") {
            self.config.execution_provider = provider;
        }
        if let Some(id) = std::env::var("YOLOV8_DEVICE_ID")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
        {
            self.config.device_id = id;
        }

        let mut attempts = self.provider_attempts().into_iter().peekable();
        let (session, provider) = loop {
            let Some((name, providers)) = attempts.next() else {
                return Err(anyhow!("no execution provider available"));
            };
            tracing::info!(provider = name, device = self.config.device_id, "building ONNX session");
            match self.build_session(providers) {
                Ok(session) => break (session, name),
                Err(e) if attempts.peek().is_some() => {
                    tracing::warn!(provider = name, error = %e, "execution provider unavailable, falling back");
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("failed to load YOLOv8 model {}", self.config.model_path)
                    })
                }
            }
        };

        self.session = Some(Mutex::new(session));
        self.provider = provider.to_string();

        tracing::info!(
            model = %self.config.model_path,
            provider = %self.provider,
            confidence = self.config.confidence_threshold,
            input_size = self.config.input_size,
            "Initialized YOLOv8 detector"
        );
        Ok(())
    }

    async fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let (detections, inference_time) = self.infer(frame)?;
        tracing::trace!(
            detections = detections.len(),
            provider = %self.provider,
            inference_ms = inference_time.as_millis() as u64,
            "YOLOv8 inference"
        );
        Ok(detections)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.session.is_some())
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down YOLOv8 detector");
        self.session = None;
        Ok(())
    }
}
