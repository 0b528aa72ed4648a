//! # Navigation
//!
//! Grid planners for the sandbox:
//! - [`DStarLite`] - incremental shortest paths for a single agent, replanned cheaply after local
//!   world edits. Used for click-to-move.
//! - [`oriented_astar`] - A* over (cell, orientation) where a quarter turn is a move in its own
//!   right. Used to choreograph agents out of the enclosure.
//! - [`grid_astar`] - plain 4-connected A*, the reference the incremental planner is checked
//!   against.
//!
//! All planners take the occupancy as an [`OccupancyView`](crate::world::OccupancyView) borrowed
//! for the duration of the call and never hold on to it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod dstar_lite;
mod frontier;
pub mod grid_astar;
pub mod oriented_astar;
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::geom::{Cell, GridPose};

pub use dstar_lite::DStarLite;
pub use params::NavParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A path of cells from start to goal inclusive. Empty when the start is already the goal.
pub type GridPath = Vec<Cell>;

/// A path of oriented poses from start to goal inclusive. Empty when the start is already the
/// goal.
pub type OrientedPath = Vec<GridPose>;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavError {
    #[error("Invalid planning request: {0}")]
    InvalidRequest(String),

    #[error("No path exists between the start and the goal")]
    NoPathFound,

    #[error("Search exceeded its iteration cap of {0}")]
    IterationCapExceeded(usize),

    #[error("Planner reached an inconsistent state: {0}")]
    InconsistentState(String),
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Number of unit moves in a path.
pub fn path_cost<T>(path: &[T]) -> usize {
    path.len().saturating_sub(1)
}
