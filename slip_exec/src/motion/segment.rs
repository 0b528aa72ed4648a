//! Motion segments and their interpolation.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Point2;
use serde::Serialize;
use util::maths::{clamp, get_ang_dist_deg, lerp, wrap_deg};

use super::MotionParams;
use crate::geom::{Cell, GridPose, Orientation};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A continuous agent pose.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    /// Footprint origin in cell units.
    pub position: Point2<f64>,

    pub heading_deg: f64,

    pub orientation: Orientation,
}

/// One timed step between two consecutive path states.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct MotionSegment {
    pub start: Waypoint,
    pub end: Waypoint,

    /// Signed shortest heading change from start to end, in [-180, 180).
    pub delta_heading_deg: f64,

    pub duration_s: f64,

    /// True if the position changes over the segment.
    pub translates: bool,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build one segment per consecutive pair of waypoints.
///
/// A segment's duration is the longest of the translation time, the rotation time and the
/// minimum segment duration.
pub fn build_segments(waypoints: &[Waypoint], params: &MotionParams) -> Vec<MotionSegment> {
    waypoints
        .windows(2)
        .map(|w| {
            let (start, end) = (w[0], w[1]);
            let dist = (end.position - start.position).norm();
            let delta_heading_deg = get_ang_dist_deg(start.heading_deg, end.heading_deg);

            let duration_s = (dist / params.linear_speed_cells_s)
                .max(delta_heading_deg.abs() / params.angular_speed_deg_s)
                .max(params.min_segment_duration_s);

            MotionSegment {
                start,
                end,
                delta_heading_deg,
                duration_s,
                translates: dist > 0.0,
            }
        })
        .collect()
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Waypoint {
    /// An agent at rest in a grid pose.
    pub fn from_pose(pose: &GridPose) -> Self {
        Self {
            position: pose.cell.to_point(),
            heading_deg: pose.orientation.heading_deg(),
            orientation: pose.orientation,
        }
    }

    /// An agent at a cell holding the given orientation and heading.
    pub fn at_cell(cell: &Cell, orientation: Orientation, heading_deg: f64) -> Self {
        Self {
            position: cell.to_point(),
            heading_deg,
            orientation,
        }
    }
}

impl MotionSegment {
    /// Interpolated pose `elapsed_s` into the segment. Times outside the segment are clamped.
    pub fn sample(&self, elapsed_s: f64) -> Waypoint {
        let frac = clamp(&(elapsed_s / self.duration_s), &0.0, &1.0);

        let position = Point2::new(
            lerp(self.start.position.x, self.end.position.x, frac),
            lerp(self.start.position.y, self.end.position.y, frac),
        );

        let heading_deg = if frac >= 1.0 {
            self.end.heading_deg
        } else {
            wrap_deg(self.start.heading_deg + self.delta_heading_deg * frac)
        };

        let orientation = if frac >= 0.5 {
            self.end.orientation
        } else {
            self.start.orientation
        };

        Waypoint {
            position,
            heading_deg,
            orientation,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
