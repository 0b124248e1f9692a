//! The background loop that turns camera frames into lane crossings.
//!
//! One task owns the loop. Every tick it snapshots the active window and
//! processes each session in window order: read a frame, detect, track,
//! accumulate, annotate, publish. A fault on one camera never stops the
//! others.

use crate::annotate;
use crate::error::LaneFault;
use crate::route::CameraSession;
use crate::state::LaneServiceState;
use crate::tracking::classify;
use bytes::Bytes;
use common::detections::Detection;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics::{LANE_CROSSINGS, LANE_DETECTION_LATENCY, LANE_FRAMES_PROCESSED};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// What happened to one session during one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Processed,
    /// Rotated out after the tick's snapshot was taken
    Retired,
    /// Source already reported end of stream
    Exhausted,
    SourceFault,
    DetectionFault,
    EncodingFault,
}

impl TickOutcome {
    pub fn label(self) -> &'static str {
        match self {
            TickOutcome::Processed => "processed",
            TickOutcome::Retired => "retired",
            TickOutcome::Exhausted => "exhausted",
            TickOutcome::SourceFault => "source_fault",
            TickOutcome::DetectionFault => "detection_fault",
            TickOutcome::EncodingFault => "encoding_fault",
        }
    }
}

enum Publish {
    Sent,
    /// Rotated out while the frame was being processed
    LeftWindow,
    EncodingFailed,
}

#[derive(Clone)]
pub struct FrameProcessor {
    state: LaneServiceState,
}

impl FrameProcessor {
    pub fn new(state: LaneServiceState) -> Self {
        Self { state }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) {
        let period = self.state.config().process_interval;
        info!(
            interval_ms = period.as_millis() as u64,
            detector = %self.state.detector_id(),
            "starting processing loop"
        );

        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(ticks, "processing loop cancelled");
                    break;
                }
                _ = interval.tick() => {
                    ticks += 1;
                    self.tick().await;
                }
            }
        }
    }

    /// Process every active session once, in window order
    pub async fn tick(&self) -> Vec<TickOutcome> {
        let sessions = self.state.sessions().await;
        let mut outcomes = Vec::with_capacity(sessions.len());
        for session in &sessions {
            let outcome = self.process(session).await;
            LANE_FRAMES_PROCESSED
                .with_label_values(&[session.camera_id(), outcome.label()])
                .inc();
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn process(&self, session: &Arc<CameraSession>) -> TickOutcome {
        if session.is_retired() {
            return TickOutcome::Retired;
        }
        let camera = session.camera().clone();
        let camera_id = camera.id.as_str();

        let mut tracker = session.tracker().lock().await;
        if tracker.exhausted {
            return TickOutcome::Exhausted;
        }

        let mut frame = match tracker.source.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracker.exhausted = true;
                LaneFault::frame_source(camera_id, "end of stream").record();
                return TickOutcome::SourceFault;
            }
            Err(e) => {
                LaneFault::frame_source(camera_id, format!("{:#}", e)).record();
                return TickOutcome::SourceFault;
            }
        };
        let frame_index = session.frame_index();

        let detections = match self.detect(camera_id, &frame).await {
            Ok(detections) => detections,
            Err(e) => {
                LaneFault::detection(camera_id, format!("{:#}", e)).record();
                annotate::draw_masks(&mut frame, &camera);
                self.publish(session, &frame).await;
                session.advance_frame();
                return TickOutcome::DetectionFault;
            }
        };

        let points: Vec<_> = detections.iter().map(|d| d.bbox.ground_point()).collect();
        let ids = tracker.identity.associate(&points);
        for (&track, &point) in ids.iter().zip(points.iter()) {
            let Some(hit) = classify(point, &camera.side_a, &camera.side_b) else {
                continue;
            };
            if let Some(sample) = tracker.crossings.observe(track, hit, frame_index) {
                if session.stats().record(&sample) {
                    LANE_CROSSINGS
                        .with_label_values(&[camera_id, &(sample.lane + 1).to_string()])
                        .inc();
                    debug!(
                        camera_id = %camera_id,
                        track,
                        lane = sample.lane + 1,
                        frames = sample.frames,
                        "lane crossing completed"
                    );
                }
            }
        }
        drop(tracker);

        annotate::draw_masks(&mut frame, &camera);
        annotate::draw_boxes(&mut frame, detections.iter().map(|d| &d.bbox));
        let published = self.publish(session, &frame).await;
        session.advance_frame();

        trace!(
            camera_id = %camera_id,
            frame_index,
            detections = detections.len(),
            "frame processed"
        );
        match published {
            Publish::Sent => TickOutcome::Processed,
            Publish::LeftWindow => TickOutcome::Retired,
            Publish::EncodingFailed => TickOutcome::EncodingFault,
        }
    }

    /// Run the detector, keeping only the tracked class
    async fn detect(
        &self,
        camera_id: &str,
        frame: &image::RgbImage,
    ) -> anyhow::Result<Vec<Detection>> {
        let started = Instant::now();
        let result = self
            .state
            .detector()
            .read()
            .await
            .detect_for(camera_id, frame)
            .await;
        LANE_DETECTION_LATENCY
            .with_label_values(&[self.state.detector_id()])
            .observe(started.elapsed().as_secs_f64());

        let tracked = &self.state.config().tracked_class;
        Ok(result?
            .into_iter()
            .filter(|d| &d.class == tracked)
            .collect())
    }

    /// Encode and publish; on encoding failure the previous frame stays
    async fn publish(&self, session: &CameraSession, frame: &image::RgbImage) -> Publish {
        match annotate::encode_jpeg(frame, self.state.config().jpeg_quality) {
            Ok(jpeg) => {
                if self.state.publish(session, Bytes::from(jpeg)).await {
                    Publish::Sent
                } else {
                    Publish::LeftWindow
                }
            }
            Err(e) => {
                LaneFault::encoding(session.camera_id(), format!("{:#}", e)).record();
                Publish::EncodingFailed
            }
        }
    }
}
