//! # Geometry
//!
//! Discrete grid primitives (cells, cardinal orientations, footprints) and the continuous
//! [`RotatedRect`] used for placement and collision checks.
//!
//! The grid uses screen coordinates: `x` grows to the right and `y` grows downwards, so north is
//! `-y`. Headings are measured in degrees clockwise from north.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod rect;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{convert::TryFrom, fmt::Display};

use nalgebra::Point2;
use sandbox_if::tc::{AreaSpec, CellSpec, OrientationSpec, PoseSpec};
use serde::{Deserialize, Serialize};

pub use rect::{rasterise, RotatedRect};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Unit steps towards north, east, south and west, in that order.
///
/// This order is the neighbour enumeration order used everywhere on the grid.
pub const CARDINAL_STEPS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An integer cell on the grid.
///
/// Coordinates are signed so that neighbour arithmetic can step off the grid and be rejected by a
/// bounds check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

/// A search state for the oriented planner, a cell plus the orientation held in it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPose {
    pub cell: Cell,
    pub orientation: Orientation,
}

/// An axis-aligned rectangle of cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub origin: Cell,
    pub width: u32,
    pub height: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// One of the four cardinal orientations an entity can hold on the grid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    North,
    East,
    South,
    West,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Get the cells covered by an entity with the given top-left origin, orientation and nominal
/// size, in row-major order.
///
/// Returns an empty vector if the origin has a negative coordinate, either dimension is zero, or
/// the far corner does not fit on the grid. Callers bound the size against the world first.
pub fn footprint_cells(origin: Cell, orientation: Orientation, width: u32, height: u32) -> Vec<Cell> {
    if origin.x < 0 || origin.y < 0 || width == 0 || height == 0 {
        return Vec::new();
    }

    let end = match footprint_end(origin, orientation, width, height) {
        Some(e) => e,
        None => return Vec::new(),
    };

    let (eff_w, eff_h) = (end.x - origin.x, end.y - origin.y);
    let mut cells = Vec::with_capacity((eff_w as usize).saturating_mul(eff_h as usize));

    for dy in 0..eff_h {
        for dx in 0..eff_w {
            cells.push(origin.offset(dx, dy));
        }
    }

    cells
}

/// The exclusive far corner of a footprint, or `None` if it cannot be represented on the grid.
pub fn footprint_end(
    origin: Cell,
    orientation: Orientation,
    width: u32,
    height: u32,
) -> Option<Cell> {
    let (eff_w, eff_h) = orientation.effective_dims(width, height);

    Some(Cell::new(
        origin.x.checked_add(i32::try_from(eff_w).ok()?)?,
        origin.y.checked_add(i32::try_from(eff_h).ok()?)?,
    ))
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Get the cell offset from this one by the given amount.
    ///
    /// Saturates at the limits of `i32`, which always lie off the grid.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// Manhattan distance between two cells.
    pub fn manhattan(&self, other: &Cell) -> u32 {
        self.x
            .abs_diff(other.x)
            .saturating_add(self.y.abs_diff(other.y))
    }

    /// The four neighbours of this cell in north, east, south, west order, with no bounds
    /// checking.
    pub fn cardinal_neighbours(&self) -> [Cell; 4] {
        let mut out = [*self; 4];
        for (n, (dx, dy)) in out.iter_mut().zip(CARDINAL_STEPS.iter()) {
            *n = self.offset(*dx, *dy);
        }
        out
    }

    /// The cell as a continuous point at its top-left corner.
    pub fn to_point(&self) -> Point2<f64> {
        Point2::new(self.x as f64, self.y as f64)
    }

    /// The cell containing the given continuous point.
    pub fn containing(point: &Point2<f64>) -> Self {
        Self::new(point.x.floor() as i32, point.y.floor() as i32)
    }

    /// The cell nearest to the given continuous footprint origin.
    pub fn nearest(point: &Point2<f64>) -> Self {
        Self::new(point.x.round() as i32, point.y.round() as i32)
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<CellSpec> for Cell {
    fn from(c: CellSpec) -> Self {
        Self::new(c.x, c.y)
    }
}

impl Orientation {
    /// All orientations in successor order.
    pub const ALL: [Orientation; 4] = [
        Orientation::North,
        Orientation::East,
        Orientation::South,
        Orientation::West,
    ];

    /// The orientation a quarter turn clockwise from this one.
    pub fn next(&self) -> Self {
        match self {
            Orientation::North => Orientation::East,
            Orientation::East => Orientation::South,
            Orientation::South => Orientation::West,
            Orientation::West => Orientation::North,
        }
    }

    /// Canonical heading of this orientation in degrees clockwise from north.
    pub fn heading_deg(&self) -> f64 {
        match self {
            Orientation::North => 0.0,
            Orientation::East => 90.0,
            Orientation::South => 180.0,
            Orientation::West => 270.0,
        }
    }

    /// The orientation whose canonical heading is nearest the given heading.
    pub fn from_heading_deg(heading_deg: f64) -> Self {
        let quarter = (util::maths::wrap_deg(heading_deg) / 90.0).round() as usize % 4;
        Self::ALL[quarter]
    }

    /// The effective (width, height) on the grid of an entity with the given nominal size.
    ///
    /// North and south keep the nominal size, east and west swap it.
    pub fn effective_dims<T>(&self, width: T, height: T) -> (T, T) {
        match self {
            Orientation::North | Orientation::South => (width, height),
            Orientation::East | Orientation::West => (height, width),
        }
    }

    /// Unit cell step in the facing direction.
    pub fn step(&self) -> (i32, i32) {
        match self {
            Orientation::North => CARDINAL_STEPS[0],
            Orientation::East => CARDINAL_STEPS[1],
            Orientation::South => CARDINAL_STEPS[2],
            Orientation::West => CARDINAL_STEPS[3],
        }
    }
}

impl From<OrientationSpec> for Orientation {
    fn from(o: OrientationSpec) -> Self {
        match o {
            OrientationSpec::North => Orientation::North,
            OrientationSpec::East => Orientation::East,
            OrientationSpec::South => Orientation::South,
            OrientationSpec::West => Orientation::West,
        }
    }
}

impl From<Orientation> for OrientationSpec {
    fn from(o: Orientation) -> Self {
        match o {
            Orientation::North => OrientationSpec::North,
            Orientation::East => OrientationSpec::East,
            Orientation::South => OrientationSpec::South,
            Orientation::West => OrientationSpec::West,
        }
    }
}

impl GridPose {
    pub fn new(x: i32, y: i32, orientation: Orientation) -> Self {
        Self {
            cell: Cell::new(x, y),
            orientation,
        }
    }

    /// Centre of the footprint of an entity of the given nominal size held in this pose.
    pub fn footprint_centre(&self, width: u32, height: u32) -> Point2<f64> {
        let (eff_w, eff_h) = self.orientation.effective_dims(width as f64, height as f64);
        Point2::new(
            self.cell.x as f64 + eff_w * 0.5,
            self.cell.y as f64 + eff_h * 0.5,
        )
    }
}

impl Display for GridPose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.cell, self.orientation)
    }
}

impl From<PoseSpec> for GridPose {
    fn from(p: PoseSpec) -> Self {
        Self::new(p.x, p.y, p.orientation.into())
    }
}

impl Area {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            origin: Cell::new(x, y),
            width,
            height,
        }
    }

    /// Returns true if the cell lies inside the area.
    pub fn contains(&self, cell: &Cell) -> bool {
        let (x, y) = (cell.x as i64, cell.y as i64);
        let (ox, oy) = (self.origin.x as i64, self.origin.y as i64);

        x >= ox && y >= oy && x < ox + self.width as i64 && y < oy + self.height as i64
    }
}

impl From<AreaSpec> for Area {
    fn from(a: AreaSpec) -> Self {
        Self::new(a.x, a.y, a.width, a.height)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
