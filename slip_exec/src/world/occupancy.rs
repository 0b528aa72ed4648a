//! Read-only occupancy view handed to the planners.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::{
    agent::AgentId,
    geom::{Cell, GridPose, Orientation},
};

use super::World;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A borrowed view of the [`World`] from the point of view of one agent.
///
/// The view binds the footprint size of the agent being planned for and the agent to exclude from
/// occupancy, so planners only ask "can the footprint sit here".
#[derive(Debug, Copy, Clone)]
pub struct OccupancyView<'w> {
    world: &'w World,
    exclude: Option<AgentId>,
    width: u32,
    height: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'w> OccupancyView<'w> {
    pub fn new(world: &'w World, exclude: Option<AgentId>, width: u32, height: u32) -> Self {
        Self {
            world,
            exclude,
            width,
            height,
        }
    }

    pub fn world(&self) -> &'w World {
        self.world
    }

    pub fn exclude(&self) -> Option<AgentId> {
        self.exclude
    }

    /// Nominal (width, height) of the footprint being planned for.
    pub fn footprint_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Grid (width, height).
    pub fn grid_dims(&self) -> (u32, u32) {
        (self.world.width(), self.world.height())
    }

    pub fn area(&self) -> usize {
        self.world.area()
    }

    pub fn in_bounds(&self, cell: &Cell) -> bool {
        self.world.in_bounds(cell)
    }

    pub fn neighbors(&self, cell: &Cell) -> Vec<(Cell, u32)> {
        self.world.neighbors(cell)
    }

    /// Returns true if the footprint fits with its origin at `cell` in the given orientation.
    pub fn is_origin_free(&self, cell: &Cell, orientation: Orientation) -> bool {
        self.world
            .footprint_free(*cell, orientation, self.width, self.height, self.exclude)
    }

    pub fn is_pose_free(&self, pose: &GridPose) -> bool {
        self.is_origin_free(&pose.cell, pose.orientation)
    }

    /// In-bounds footprint origins whose footprint, in the given orientation, covers `cell`.
    pub fn origins_covering(&self, cell: &Cell, orientation: Orientation) -> Vec<Cell> {
        // Offsets past the grid size can only reach out-of-bounds origins
        let (eff_w, eff_h) = orientation.effective_dims(self.width, self.height);
        let (grid_w, grid_h) = self.grid_dims();
        let (eff_w, eff_h) = (eff_w.min(grid_w) as i32, eff_h.min(grid_h) as i32);
        let mut origins = Vec::with_capacity(eff_w as usize * eff_h as usize);

        for dy in 0..eff_h {
            for dx in 0..eff_w {
                let origin = cell.offset(-dx, -dy);
                if self.in_bounds(&origin) {
                    origins.push(origin);
                }
            }
        }

        origins
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
