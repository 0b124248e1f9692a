//! Per-camera tracking core.
//!
//! Detections flow through [`identity::IdentityTracker`] (who is this?),
//! [`lanes::classify`] (which lane mask is it standing in?) and
//! [`crossing::CrossingAccumulator`] (did it just finish crossing a lane?).
//! Completed crossings land in [`stats::LaneStats`].

pub mod crossing;
pub mod identity;
pub mod lanes;
pub mod stats;

pub use crossing::{CrossingAccumulator, CrossingSample};
pub use identity::{IdentityTracker, TrackId};
pub use lanes::{classify, Direction, LaneCode, LaneHit};
pub use stats::{LaneStats, LaneSummary};
