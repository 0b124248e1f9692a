use common::geo::PixelPoint;
use std::collections::BTreeMap;

pub type TrackId = u64;

/// Frame-to-frame identity association.
///
/// Policy: unconstrained nearest-previous, last write wins on contention.
/// Each detection independently looks for the closest point of the previous
/// frame; claimed points stay in the pool, so two detections may resolve to
/// the same id. When that happens the detection processed later owns the id's
/// position in the next frame. Two vehicles squeezed within the threshold of
/// one previous point therefore briefly share an identity.
#[derive(Debug, Clone)]
pub struct IdentityTracker {
    threshold: f64,
    previous: BTreeMap<TrackId, PixelPoint>,
    next_id: TrackId,
}

impl IdentityTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Assign an id to every point of the current frame, in order, and make
    /// this frame the reference for the next call.
    pub fn associate(&mut self, points: &[PixelPoint]) -> Vec<TrackId> {
        let mut current = BTreeMap::new();
        let mut ids = Vec::with_capacity(points.len());

        for point in points {
            let id = match self.nearest_previous(point) {
                Some((id, distance)) if distance < self.threshold => id,
                _ => self.mint(),
            };
            current.insert(id, *point);
            ids.push(id);
        }

        self.previous = current;
        ids
    }

    fn nearest_previous(&self, point: &PixelPoint) -> Option<(TrackId, f64)> {
        self.previous
            .iter()
            .map(|(id, prev)| (*id, prev.distance(point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn mint(&mut self) -> TrackId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Next id that will be issued
    pub fn next_id(&self) -> TrackId {
        self.next_id
    }

    /// Identities visible in the last associated frame
    pub fn tracked(&self) -> &BTreeMap<TrackId, PixelPoint> {
        &self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> PixelPoint {
        PixelPoint::new(x, y)
    }

    #[test]
    fn test_first_frame_mints_fresh_ids() {
        let mut tracker = IdentityTracker::new(15.0);
        let ids = tracker.associate(&[p(0.0, 0.0), p(100.0, 0.0), p(200.0, 0.0)]);
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(tracker.next_id(), 3);
    }

    #[test]
    fn test_reuses_id_within_threshold() {
        let mut tracker = IdentityTracker::new(15.0);
        tracker.associate(&[p(0.0, 0.0), p(100.0, 0.0)]);

        let ids = tracker.associate(&[p(103.0, 4.0)]);
        assert_eq!(ids, vec![1]);
        assert_eq!(tracker.next_id(), 2);
    }

    #[test]
    fn test_far_detection_gets_never_issued_id() {
        let mut tracker = IdentityTracker::new(15.0);
        let first = tracker.associate(&[p(0.0, 0.0), p(100.0, 0.0)]);

        let ids = tracker.associate(&[p(50.0, 50.0)]);
        assert_eq!(ids.len(), 1);
        assert!(!first.contains(&ids[0]));
        assert_eq!(ids[0], 2);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut tracker = IdentityTracker::new(15.0);
        tracker.associate(&[p(0.0, 0.0)]);
        let ids = tracker.associate(&[p(15.0, 0.0)]);
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_lost_tracks_are_forgotten() {
        let mut tracker = IdentityTracker::new(15.0);
        tracker.associate(&[p(0.0, 0.0)]);
        tracker.associate(&[]);
        let ids = tracker.associate(&[p(1.0, 1.0)]);
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_contention_last_write_wins() {
        let mut tracker = IdentityTracker::new(15.0);
        tracker.associate(&[p(0.0, 0.0)]);

        let ids = tracker.associate(&[p(2.0, 0.0), p(-3.0, 0.0)]);
        assert_eq!(ids, vec![0, 0]);
        assert_eq!(tracker.tracked().len(), 1);
        assert_eq!(tracker.tracked()[&0], p(-3.0, 0.0));
    }

    #[test]
    fn test_ids_strictly_increase() {
        let mut tracker = IdentityTracker::new(5.0);
        let mut last = None;
        for step in 0..10 {
            let ids = tracker.associate(&[p(step as f64 * 100.0, 0.0)]);
            if let Some(prev) = last {
                assert!(ids[0] > prev);
            }
            last = Some(ids[0]);
        }
    }
}
