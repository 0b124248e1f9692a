use super::identity::TrackId;
use super::lanes::{LaneCode, LaneHit};
use std::collections::HashMap;

/// A completed entry/exit pair for one track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingSample {
    pub track: TrackId,
    pub lane: usize,
    /// Frames elapsed between the opening and closing observation
    pub frames: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenCrossing {
    code: LaneCode,
    frame: u64,
}

/// Per-track crossing state machine.
///
/// The first classified observation of a track opens a crossing. Only an
/// observation of the same lane on the opposite side closes it; anything else
/// leaves the open entry untouched.
#[derive(Debug, Clone, Default)]
pub struct CrossingAccumulator {
    open: HashMap<TrackId, OpenCrossing>,
}

impl CrossingAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, track: TrackId, hit: LaneHit, frame: u64) -> Option<CrossingSample> {
        let code = hit.code();
        match self.open.get(&track) {
            None => {
                self.open.insert(track, OpenCrossing { code, frame });
                None
            }
            Some(open) if open.code == code.opposite() => {
                let sample = CrossingSample {
                    track,
                    lane: code.lane(),
                    frames: frame.saturating_sub(open.frame),
                };
                self.open.remove(&track);
                Some(sample)
            }
            Some(_) => None,
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn is_open(&self, track: TrackId) -> bool {
        self.open.contains_key(&track)
    }
}
