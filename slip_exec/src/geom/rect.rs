//! Rotated rectangles and Separating Axis Theorem overlap tests.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Point2, Rotation2, Vector2};
use sandbox_if::tc::RectSpec;
use serde::{Deserialize, Serialize};

use super::{Cell, Orientation};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Tolerance for projection interval comparisons, absorbs trig round-off so that touching
/// rectangles are not reported as overlapping.
const SAT_EPSILON: f64 = 1e-9;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A rectangle in continuous cell units, rotated about its centre.
///
/// Rotation is in degrees clockwise on screen (`+y` down).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotatedRect {
    pub centre: Point2<f64>,
    pub width: f64,
    pub height: f64,
    pub rotation_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Get all cells whose unit square overlaps the rectangle, in row-major order.
///
/// Cells may lie off the grid, callers filter them against their bounds.
pub fn rasterise(rect: &RotatedRect) -> Vec<Cell> {
    let (min, max) = rect.aabb();
    let min_cell = Cell::containing(&min);
    let max_cell = Cell::containing(&max);

    let mut cells = Vec::new();

    for y in min_cell.y..=max_cell.y {
        for x in min_cell.x..=max_cell.x {
            let cell = Cell::new(x, y);
            if RotatedRect::cell_square(cell).overlaps(rect) {
                cells.push(cell);
            }
        }
    }

    cells
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RotatedRect {
    pub fn new(centre: Point2<f64>, width: f64, height: f64, rotation_deg: f64) -> Self {
        Self {
            centre,
            width,
            height,
            rotation_deg,
        }
    }

    /// The unit square covering the given cell.
    pub fn cell_square(cell: Cell) -> Self {
        Self::new(
            Point2::new(cell.x as f64 + 0.5, cell.y as f64 + 0.5),
            1.0,
            1.0,
            0.0,
        )
    }

    /// The rectangle occupied by an entity of the given nominal size with its footprint origin at
    /// `origin` and holding `orientation`.
    ///
    /// The rectangle's extent is the orientation's effective size, and its rotation is whatever
    /// remains of `heading_deg` after the orientation's canonical heading is removed. An entity
    /// resting in its orientation therefore gives an axis-aligned rectangle.
    pub fn from_footprint(
        origin: Point2<f64>,
        orientation: Orientation,
        width: f64,
        height: f64,
        heading_deg: f64,
    ) -> Self {
        let (eff_w, eff_h) = orientation.effective_dims(width, height);
        let centre = origin + Vector2::new(eff_w * 0.5, eff_h * 0.5);

        Self::new(
            centre,
            eff_w,
            eff_h,
            util::maths::get_ang_dist_deg(orientation.heading_deg(), heading_deg),
        )
    }

    /// Returns true if every field is finite and neither dimension is negative.
    pub fn is_well_formed(&self) -> bool {
        self.centre.x.is_finite()
            && self.centre.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.rotation_deg.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }

    /// Corners in order top-left, top-right, bottom-right, bottom-left (before rotation).
    pub fn corners(&self) -> [Point2<f64>; 4] {
        let rot = Rotation2::new(self.rotation_deg.to_radians());
        let hw = self.width * 0.5;
        let hh = self.height * 0.5;

        [
            self.centre + rot * Vector2::new(-hw, -hh),
            self.centre + rot * Vector2::new(hw, -hh),
            self.centre + rot * Vector2::new(hw, hh),
            self.centre + rot * Vector2::new(-hw, hh),
        ]
    }

    /// Axis-aligned bounding box as (min, max) corners.
    pub fn aabb(&self) -> (Point2<f64>, Point2<f64>) {
        let corners = self.corners();
        let mut min = corners[0];
        let mut max = corners[0];

        for c in corners.iter().skip(1) {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }

        (min, max)
    }

    /// Returns true if the interiors of the two rectangles intersect.
    ///
    /// Rectangles which only touch along an edge or at a corner do not overlap.
    pub fn overlaps(&self, other: &RotatedRect) -> bool {
        let corners_a = self.corners();
        let corners_b = other.corners();

        let mut axes: Vec<Vector2<f64>> = Vec::with_capacity(4);
        for corners in [&corners_a, &corners_b].iter() {
            // Two edges per rectangle, the opposite ones are parallel
            for (i, j) in [(0, 1), (1, 2)].iter() {
                let edge = corners[*j] - corners[*i];
                if edge.norm() < SAT_EPSILON {
                    continue;
                }

                let normal = Vector2::new(-edge.y, edge.x).normalize();

                let parallel = axes
                    .iter()
                    .any(|a| (a.x * normal.y - a.y * normal.x).abs() < SAT_EPSILON);
                if !parallel {
                    axes.push(normal);
                }
            }
        }

        // Two degenerate rectangles give no axes, treat them as points/lines that can't overlap
        if axes.is_empty() {
            return false;
        }

        axes.iter().all(|axis| {
            let (min_a, max_a) = project(&corners_a, axis);
            let (min_b, max_b) = project(&corners_b, axis);

            max_a - min_b > SAT_EPSILON && max_b - min_a > SAT_EPSILON
        })
    }
}

impl From<RectSpec> for RotatedRect {
    fn from(r: RectSpec) -> Self {
        Self::new(Point2::new(r.cx, r.cy), r.width, r.height, r.rotation_deg)
    }
}

fn project(corners: &[Point2<f64>; 4], axis: &Vector2<f64>) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;

    for c in corners.iter() {
        let dot = c.coords.dot(axis);
        lo = lo.min(dot);
        hi = hi.max(dot);
    }

    (lo, hi)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
