use thiserror::Error;

/// Recoverable faults raised while matching routes and processing cameras.
///
/// None of these stop the service: each one is logged, counted and the
/// affected camera (or route point) is skipped.
#[derive(Debug, Error)]
pub enum LaneFault {
    #[error("no camera within tolerance of ({latitude}, {longitude})")]
    RouteMatchMiss { latitude: f64, longitude: f64 },

    #[error("route queue exhausted while rotating away from camera '{released}'")]
    QueueExhausted { released: String },

    #[error("frame source for camera '{camera_id}' failed: {reason}")]
    FrameSourceFault { camera_id: String, reason: String },

    #[error("detector failed on camera '{camera_id}': {reason}")]
    DetectionFault { camera_id: String, reason: String },

    #[error("failed to encode frame for camera '{camera_id}': {reason}")]
    EncodingFault { camera_id: String, reason: String },
}

impl LaneFault {
    /// Stable label used for the faults metric
    pub fn kind(&self) -> &'static str {
        match self {
            LaneFault::RouteMatchMiss { .. } => "route_match_miss",
            LaneFault::QueueExhausted { .. } => "queue_exhausted",
            LaneFault::FrameSourceFault { .. } => "frame_source",
            LaneFault::DetectionFault { .. } => "detection",
            LaneFault::EncodingFault { .. } => "encoding",
        }
    }

    pub fn frame_source(camera_id: &str, reason: impl ToString) -> Self {
        Self::FrameSourceFault {
            camera_id: camera_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn detection(camera_id: &str, reason: impl ToString) -> Self {
        Self::DetectionFault {
            camera_id: camera_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn encoding(camera_id: &str, reason: impl ToString) -> Self {
        Self::EncodingFault {
            camera_id: camera_id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Log the fault and bump its counter
    pub fn record(&self) {
        telemetry::metrics::LANE_FAULTS
            .with_label_values(&[self.kind()])
            .inc();
        match self {
            LaneFault::RouteMatchMiss { .. } => tracing::debug!(fault = %self, "route point skipped"),
            _ => tracing::warn!(fault = %self, kind = self.kind(), "recoverable fault"),
        }
    }
}
