use super::crossing::CrossingSample;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct LaneCounter {
    frames_total: AtomicU64,
    crossings: AtomicU64,
}

/// Per-lane timing accumulators for one camera.
///
/// Only the processing loop writes. Readers get a relaxed, possibly
/// one-tick-stale view without taking a lock.
#[derive(Debug)]
pub struct LaneStats {
    lanes: Vec<LaneCounter>,
}

/// Point-in-time copy of one lane's accumulators
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LaneSummary {
    pub frames_total: u64,
    pub crossings: u64,
}

impl LaneSummary {
    /// Mean crossing duration in frames, if any crossing completed
    pub fn mean_frames(&self) -> Option<f64> {
        (self.crossings > 0).then(|| self.frames_total as f64 / self.crossings as f64)
    }

    /// Crossings per second at `fps`; zero-duration crossings are clamped to
    /// one frame. Lanes without samples have no score.
    pub fn score(&self, fps: f64) -> Option<f64> {
        self.mean_frames().map(|mean| fps / mean.max(1.0))
    }
}

impl LaneStats {
    pub fn new(lane_count: usize) -> Self {
        Self {
            lanes: (0..lane_count).map(|_| LaneCounter::default()).collect(),
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Fold a completed crossing into its lane. Returns false if the lane is
    /// outside this camera's lane range.
    pub fn record(&self, sample: &CrossingSample) -> bool {
        match self.lanes.get(sample.lane) {
            Some(counter) => {
                counter
                    .frames_total
                    .fetch_add(sample.frames, Ordering::Relaxed);
                counter.crossings.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<LaneSummary> {
        self.lanes
            .iter()
            .map(|counter| LaneSummary {
                frames_total: counter.frames_total.load(Ordering::Relaxed),
                crossings: counter.crossings.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Score for every lane, zero where no crossing completed yet
    pub fn scores(&self, fps: f64) -> Vec<f64> {
        self.snapshot()
            .iter()
            .map(|lane| lane.score(fps).unwrap_or(0.0))
            .collect()
    }

    /// Scores of lanes that have at least one completed crossing
    pub fn observed_scores(&self, fps: f64) -> Vec<f64> {
        self.snapshot()
            .iter()
            .filter_map(|lane| lane.score(fps))
            .collect()
    }
}
