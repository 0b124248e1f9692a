use common::geo::{PixelPoint, Polygon};

/// Which side of the camera's view a lane mask belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Side A (`mask1`)
    Exit,
    /// Side B (`mask2`)
    Entry,
}

impl Direction {
    pub fn sign(self) -> i32 {
        match self {
            Direction::Exit => 1,
            Direction::Entry => -1,
        }
    }
}

/// A detection standing inside one lane mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneHit {
    pub lane: usize,
    pub direction: Direction,
}

impl LaneHit {
    pub fn code(&self) -> LaneCode {
        LaneCode(self.direction.sign() * (self.lane as i32 + 1))
    }
}

/// Signed lane code `direction * (lane + 1)`; never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneCode(i32);

impl LaneCode {
    pub fn lane(self) -> usize {
        (self.0.unsigned_abs() - 1) as usize
    }

    /// The same lane seen from the other side
    pub fn opposite(self) -> LaneCode {
        LaneCode(-self.0)
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

/// Classify a point against the exit masks first, then the entry masks.
/// The first polygon containing the point wins.
pub fn classify(point: PixelPoint, side_a: &[Polygon], side_b: &[Polygon]) -> Option<LaneHit> {
    first_containing(side_a, point)
        .map(|lane| LaneHit {
            lane,
            direction: Direction::Exit,
        })
        .or_else(|| {
            first_containing(side_b, point).map(|lane| LaneHit {
                lane,
                direction: Direction::Entry,
            })
        })
}

fn first_containing(masks: &[Polygon], point: PixelPoint) -> Option<usize> {
    masks.iter().position(|mask| mask.contains(point))
}
