use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Processing loop ====
    pub static ref LANE_FRAMES_PROCESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "lane_frames_processed_total",
                "Frames pulled from camera sources by outcome",
            ),
            &["camera_id", "outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LANE_DETECTION_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "lane_detection_latency_seconds",
                "Latency of detector calls",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["detector"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LANE_CROSSINGS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "lane_crossings_total",
                "Completed entry/exit crossings per lane",
            ),
            &["camera_id", "lane"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LANE_FAULTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("lane_faults_total", "Recoverable faults by kind"),
            &["kind"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Route session ====
    pub static ref LANE_ACTIVE_CAMERAS: IntGauge = {
        let metric = IntGauge::new("lane_active_cameras", "Cameras in the active window")
            .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LANE_ROUTE_QUEUE_DEPTH: IntGauge = {
        let metric = IntGauge::new(
            "lane_route_queue_depth",
            "Matched cameras waiting to enter the active window",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Streaming ====
    pub static ref LANE_STREAM_CLIENTS: IntGauge = {
        let metric = IntGauge::new("lane_stream_clients", "Connected MJPEG stream clients")
            .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Render every registered metric in the prometheus text format
pub fn encode_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    Ok(encoder.encode_to_string(&families)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_metrics_accessible() {
        LANE_FRAMES_PROCESSED
            .with_label_values(&["cam-test", "ok"])
            .inc();
        assert_eq!(
            LANE_FRAMES_PROCESSED
                .with_label_values(&["cam-test", "ok"])
                .get(),
            1
        );
    }

    #[test]
    fn test_window_gauges_accessible() {
        LANE_ACTIVE_CAMERAS.set(3);
        assert_eq!(LANE_ACTIVE_CAMERAS.get(), 3);
    }

    #[test]
    fn test_encode_metrics_includes_registered_families() {
        LANE_FAULTS.with_label_values(&["encoding"]).inc();
        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("lane_faults_total"));
    }
}
