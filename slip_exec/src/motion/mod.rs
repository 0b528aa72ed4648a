//! # Motion scheduler
//!
//! Turns a discrete path into timed motion. Each consecutive pair of path states becomes a
//! [`MotionSegment`] whose duration is set by whichever of translation or rotation takes longer.
//! The [`MotionScheduler`] advances through the segments by the tick duration and reports the
//! interpolated pose of the agent it is driving.
//!
//! Position is interpolated linearly, heading along the shortest arc, and the discrete
//! orientation switches halfway through a segment.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
mod segment;
mod state;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use params::MotionParams;
pub use segment::{build_segments, MotionSegment, Waypoint};
pub use state::{MotionMode, MotionSample, MotionScheduler, StatusReport};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MotionError {
    #[error("Attempted to load an empty segment sequence")]
    AttemptEmptySeqLoad,

    #[error("Invalid motion parameters: {0}")]
    InvalidParams(String),

    #[error("Scheduler is executing but has no segment at index {0}")]
    NoSegment(usize),
}
