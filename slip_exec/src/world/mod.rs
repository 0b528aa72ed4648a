//! # World model
//!
//! The [`World`] holds everything that decides whether a cell is free: the grid bounds, the
//! optional allowed sub-area, static single-cell obstacles, free-form obstacle rectangles and the
//! footprints of every tracked agent.
//!
//! Static obstacles, rectangles and the allowed area are baked into a blocked-cell grid on each
//! edit. Edits return the cells whose blocked state changed so that callers can hand them to an
//! incremental planner. Agent footprints are not baked, they are checked per query so that one
//! agent can be excluded (an agent never collides with itself).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod occupancy;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, trace};
use nalgebra::Point2;
use ndarray::Array2;

use crate::{
    agent::AgentId,
    geom::{footprint_cells, footprint_end, rasterise, Area, Cell, Orientation, RotatedRect},
};

pub use occupancy::OccupancyView;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Identifier of an obstacle rectangle in the world.
pub type ObstacleId = u32;

#[derive(Debug, Clone)]
pub struct World {
    width: u32,
    height: u32,

    allowed_area: Option<Area>,

    static_cells: BTreeSet<Cell>,

    obstacle_rects: BTreeMap<ObstacleId, RotatedRect>,

    next_obstacle_id: ObstacleId,

    /// Baked blocked state of each cell, indexed `[[x, y]]`.
    blocked: Array2<bool>,

    agents: BTreeMap<AgentId, TrackedAgent>,
}

/// The footprint of an agent as tracked by the world.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TrackedAgent {
    /// Cell footprint used for grid occupancy.
    pub origin: Cell,
    pub orientation: Orientation,
    pub width: u32,
    pub height: u32,

    /// Continuous rectangle used for placement checks.
    pub rect: RotatedRect,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("The world must be at least 1x1 cells, got {0}x{1}")]
    InvalidDimensions(u32, u32),

    #[error("Cell {0} is outside the world")]
    CellOutOfBounds(Cell),

    #[error("No obstacle rectangle with id {0}")]
    UnknownObstacle(ObstacleId),

    #[error("Agent {0} is not tracked by the world")]
    UnknownAgent(AgentId),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl World {
    /// Create a new open world of the given size.
    pub fn new(width: u32, height: u32) -> Result<Self, WorldError> {
        if !dims_valid(width, height) {
            return Err(WorldError::InvalidDimensions(width, height));
        }

        Ok(Self {
            width,
            height,
            allowed_area: None,
            static_cells: BTreeSet::new(),
            obstacle_rects: BTreeMap::new(),
            next_obstacle_id: 0,
            blocked: Array2::from_elem((width as usize, height as usize), false),
            agents: BTreeMap::new(),
        })
    }

    /// Reconfigure the world's size and allowed area.
    ///
    /// All obstacles are cleared. Tracked agents are kept. The returned cells are those blocked in
    /// the new world, i.e. the changes relative to an open grid of the new size.
    pub fn configure(
        &mut self,
        width: u32,
        height: u32,
        allowed_area: Option<Area>,
    ) -> Result<Vec<Cell>, WorldError> {
        if !dims_valid(width, height) {
            return Err(WorldError::InvalidDimensions(width, height));
        }

        self.width = width;
        self.height = height;
        self.allowed_area = allowed_area;
        self.static_cells.clear();
        self.obstacle_rects.clear();
        self.blocked = Array2::from_elem((width as usize, height as usize), false);

        match allowed_area {
            Some(a) => info!(
                "World configured as {}x{} with allowed area {}x{} at {}",
                width, height, a.width, a.height, a.origin
            ),
            None => info!("World configured as {}x{}", width, height),
        }

        Ok(self.rebake())
    }

    /// Replace the set of static single-cell obstacles.
    pub fn set_obstacles(&mut self, cells: &[Cell]) -> Result<Vec<Cell>, WorldError> {
        if let Some(c) = cells.iter().find(|c| !self.in_bounds(c)) {
            return Err(WorldError::CellOutOfBounds(*c));
        }

        self.static_cells = cells.iter().copied().collect();

        Ok(self.rebake())
    }

    /// Add a free-form obstacle rectangle, returning its id and the changed cells.
    pub fn add_obstacle_rect(&mut self, rect: RotatedRect) -> (ObstacleId, Vec<Cell>) {
        let id = self.next_obstacle_id;
        self.next_obstacle_id += 1;
        self.obstacle_rects.insert(id, rect);

        debug!("Added obstacle rect {}: {:?}", id, rect);

        (id, self.rebake())
    }

    /// Remove an obstacle rectangle, returning the changed cells.
    pub fn remove_obstacle_rect(&mut self, id: ObstacleId) -> Result<Vec<Cell>, WorldError> {
        self.obstacle_rects
            .remove(&id)
            .ok_or(WorldError::UnknownObstacle(id))?;

        debug!("Removed obstacle rect {}", id);

        Ok(self.rebake())
    }

    /// Set or clear the allowed sub-area, returning the changed cells.
    pub fn set_allowed_area(&mut self, area: Option<Area>) -> Vec<Cell> {
        self.allowed_area = area;
        self.rebake()
    }

    /// Remove all obstacles, keeping the size, allowed area and agents.
    pub fn clear_obstacles(&mut self) -> Vec<Cell> {
        self.static_cells.clear();
        self.obstacle_rects.clear();
        self.rebake()
    }

    /// Start tracking an agent's footprint.
    pub fn track_agent(&mut self, id: AgentId, footprint: TrackedAgent) {
        self.agents.insert(id, footprint);
    }

    /// Update a tracked agent's footprint.
    pub fn move_agent(&mut self, id: AgentId, footprint: TrackedAgent) -> Result<(), WorldError> {
        match self.agents.get_mut(&id) {
            Some(a) => {
                *a = footprint;
                Ok(())
            }
            None => Err(WorldError::UnknownAgent(id)),
        }
    }

    /// Stop tracking an agent.
    pub fn untrack_agent(&mut self, id: AgentId) -> Result<(), WorldError> {
        self.agents
            .remove(&id)
            .map(|_| ())
            .ok_or(WorldError::UnknownAgent(id))
    }

    pub fn untrack_all_agents(&mut self) {
        self.agents.clear();
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells in the grid.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn allowed_area(&self) -> Option<Area> {
        self.allowed_area
    }

    pub fn obstacle_rects(&self) -> &BTreeMap<ObstacleId, RotatedRect> {
        &self.obstacle_rects
    }

    pub fn tracked_agents(&self) -> &BTreeMap<AgentId, TrackedAgent> {
        &self.agents
    }

    pub fn in_bounds(&self, cell: &Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as u32) < self.width && (cell.y as u32) < self.height
    }

    /// Returns true if the static part of the world (bounds, allowed area, obstacles) blocks the
    /// cell.
    pub fn is_blocked(&self, cell: &Cell) -> bool {
        if !self.in_bounds(cell) {
            return true;
        }

        self.blocked[[cell.x as usize, cell.y as usize]]
    }

    /// Returns true if the cell is in bounds, unblocked, and not covered by any agent other than
    /// `exclude`.
    pub fn is_free(&self, cell: &Cell, exclude: Option<AgentId>) -> bool {
        if self.is_blocked(cell) {
            return false;
        }

        !self
            .agents
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .any(|(_, a)| a.covers(cell))
    }

    /// Returns true if every cell of the footprint is free.
    ///
    /// An invalid footprint (negative origin, zero size) is never free.
    pub fn footprint_free(
        &self,
        origin: Cell,
        orientation: Orientation,
        width: u32,
        height: u32,
        exclude: Option<AgentId>,
    ) -> bool {
        let end = match footprint_end(origin, orientation, width, height) {
            Some(e) => e,
            None => return false,
        };
        if !self.in_bounds(&origin)
            || end.x as i64 > self.width as i64
            || end.y as i64 > self.height as i64
        {
            return false;
        }

        let cells = footprint_cells(origin, orientation, width, height);

        !cells.is_empty() && cells.iter().all(|c| self.is_free(c, exclude))
    }

    /// In-bounds 4-connected neighbours of the cell with their step cost, in north, east, south,
    /// west order.
    pub fn neighbors(&self, cell: &Cell) -> Vec<(Cell, u32)> {
        cell.cardinal_neighbours()
            .iter()
            .filter(|n| self.in_bounds(n))
            .map(|n| (*n, 1))
            .collect()
    }

    /// Returns true if the rectangle lies inside the world (and allowed area) and overlaps no
    /// obstacle and no agent other than `exclude`.
    pub fn is_placement_valid(&self, rect: &RotatedRect, exclude: Option<AgentId>) -> bool {
        if !rect.is_well_formed() {
            return false;
        }

        let (min, max) = rect.aabb();
        let (lo, hi) = match self.allowed_area {
            Some(a) => (
                a.origin.to_point(),
                Point2::new(
                    a.origin.x as f64 + a.width as f64,
                    a.origin.y as f64 + a.height as f64,
                ),
            ),
            None => (
                Point2::new(0.0, 0.0),
                Point2::new(self.width as f64, self.height as f64),
            ),
        };

        const EPS: f64 = 1e-9;
        if min.x < lo.x - EPS || min.y < lo.y - EPS || max.x > hi.x + EPS || max.y > hi.y + EPS {
            return false;
        }

        if self.static_cells.iter().any(|c| RotatedRect::cell_square(*c).overlaps(rect)) {
            return false;
        }

        if self.obstacle_rects.values().any(|o| o.overlaps(rect)) {
            return false;
        }

        !self
            .agents
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .any(|(_, a)| a.rect.overlaps(rect))
    }

    /// Borrow a read-only view of the world for planning with the given agent footprint.
    pub fn view(&self, exclude: Option<AgentId>, width: u32, height: u32) -> OccupancyView<'_> {
        OccupancyView::new(self, exclude, width, height)
    }

    /// Recompute the blocked grid, returning the cells whose state changed in row-major order.
    fn rebake(&mut self) -> Vec<Cell> {
        let mut new_blocked = Array2::from_elem((self.width as usize, self.height as usize), false);

        if let Some(area) = self.allowed_area {
            for ((x, y), b) in new_blocked.indexed_iter_mut() {
                *b = !area.contains(&Cell::new(x as i32, y as i32));
            }
        }

        for c in self.static_cells.iter().filter(|c| self.in_bounds(c)) {
            new_blocked[[c.x as usize, c.y as usize]] = true;
        }

        for rect in self.obstacle_rects.values() {
            for c in rasterise(rect).iter().filter(|c| self.in_bounds(c)) {
                new_blocked[[c.x as usize, c.y as usize]] = true;
            }
        }

        let mut changed = Vec::new();
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                if new_blocked[[x, y]] != self.blocked[[x, y]] {
                    changed.push(Cell::new(x as i32, y as i32));
                }
            }
        }

        trace!("World rebaked, {} cells changed", changed.len());

        self.blocked = new_blocked;
        changed
    }
}

impl TrackedAgent {
    /// Returns true if the agent's cell footprint covers the cell.
    pub fn covers(&self, cell: &Cell) -> bool {
        let (eff_w, eff_h) = self.orientation.effective_dims(self.width as i64, self.height as i64);
        let (x, y) = (cell.x as i64, cell.y as i64);
        let (ox, oy) = (self.origin.x as i64, self.origin.y as i64);

        x >= ox && y >= oy && x < ox + eff_w && y < oy + eff_h
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// World dimensions must be non-zero and addressable by signed cell coordinates.
fn dims_valid(width: u32, height: u32) -> bool {
    width > 0 && height > 0 && width <= i32::MAX as u32 && height <= i32::MAX as u32
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn tracked(x: i32, y: i32, orientation: Orientation, w: u32, h: u32) -> TrackedAgent {
        let origin = Cell::new(x, y);
        TrackedAgent {
            origin,
            orientation,
            width: w,
            height: h,
            rect: RotatedRect::from_footprint(
                origin.to_point(),
                orientation,
                w as f64,
                h as f64,
                orientation.heading_deg(),
            ),
        }
    }

    #[test]
    fn test_edits_report_changed_cells() {
        let mut world = World::new(5, 5).unwrap();

        let changed = world
            .set_obstacles(&[Cell::new(1, 1), Cell::new(2, 1)])
            .unwrap();
        assert_eq!(changed, vec![Cell::new(1, 1), Cell::new(2, 1)]);

        // Only the difference is reported
        let changed = world
            .set_obstacles(&[Cell::new(2, 1), Cell::new(3, 3)])
            .unwrap();
        assert_eq!(changed, vec![Cell::new(1, 1), Cell::new(3, 3)]);

        let (id, changed) = world.add_obstacle_rect(RotatedRect::new(
            Point2::new(1.0, 4.5),
            2.0,
            1.0,
            0.0,
        ));
        assert_eq!(changed, vec![Cell::new(0, 4), Cell::new(1, 4)]);

        let changed = world.remove_obstacle_rect(id).unwrap();
        assert_eq!(changed, vec![Cell::new(0, 4), Cell::new(1, 4)]);

        assert!(matches!(
            world.remove_obstacle_rect(id),
            Err(WorldError::UnknownObstacle(_))
        ));
        assert!(matches!(
            world.set_obstacles(&[Cell::new(5, 0)]),
            Err(WorldError::CellOutOfBounds(_))
        ));
    }

    #[test]
    fn test_allowed_area() {
        let mut world = World::new(4, 4).unwrap();
        let changed = world.set_allowed_area(Some(Area::new(1, 1, 2, 2)));

        assert_eq!(changed.len(), 12);
        assert!(world.is_free(&Cell::new(1, 1), None));
        assert!(!world.is_free(&Cell::new(0, 0), None));
        assert!(!world.is_free(&Cell::new(3, 2), None));

        let rect = RotatedRect::new(Point2::new(2.0, 2.0), 2.0, 2.0, 0.0);
        assert!(world.is_placement_valid(&rect, None));
        let rect = RotatedRect::new(Point2::new(2.0, 2.0), 2.0, 2.0, 45.0);
        assert!(!world.is_placement_valid(&rect, None));
    }

    #[test]
    fn test_agent_exclusion() {
        let mut world = World::new(6, 6).unwrap();
        world.track_agent(1, tracked(1, 1, Orientation::North, 2, 1));
        world.track_agent(2, tracked(4, 1, Orientation::East, 2, 1));

        assert!(!world.is_free(&Cell::new(2, 1), None));
        assert!(world.is_free(&Cell::new(2, 1), Some(1)));
        assert!(!world.is_free(&Cell::new(4, 2), Some(1)));
        assert!(world.is_free(&Cell::new(5, 1), None));

        assert!(world.footprint_free(Cell::new(1, 1), Orientation::North, 2, 1, Some(1)));
        assert!(!world.footprint_free(Cell::new(3, 1), Orientation::North, 2, 1, Some(1)));
        assert!(!world.footprint_free(Cell::new(5, 5), Orientation::North, 2, 1, None));

        let over_2 = tracked(3, 2, Orientation::North, 2, 1).rect;
        assert!(!world.is_placement_valid(&over_2, Some(1)));
        assert!(world.is_placement_valid(&over_2, Some(2)));

        world.untrack_agent(2).unwrap();
        assert!(world.is_free(&Cell::new(4, 2), None));
        assert!(world.untrack_agent(2).is_err());
    }

    #[test]
    fn test_neighbour_order_and_bounds() {
        let world = World::new(3, 3).unwrap();

        assert_eq!(
            world.neighbors(&Cell::new(1, 1)),
            vec![
                (Cell::new(1, 0), 1),
                (Cell::new(2, 1), 1),
                (Cell::new(1, 2), 1),
                (Cell::new(0, 1), 1)
            ]
        );
        assert_eq!(
            world.neighbors(&Cell::new(0, 0)),
            vec![(Cell::new(1, 0), 1), (Cell::new(0, 1), 1)]
        );
    }

    #[test]
    fn test_malformed_requests_rejected() {
        assert!(matches!(
            World::new(u32::MAX, 4),
            Err(WorldError::InvalidDimensions(_, _))
        ));

        let mut world = World::new(8, 8).unwrap();

        // Footprints far larger than the world or reaching past the grid coordinates
        assert!(!world.footprint_free(Cell::new(0, 0), Orientation::North, 70000, 70000, None));
        assert!(!world.footprint_free(Cell::new(i32::MAX, 0), Orientation::North, 2, 1, None));
        assert!(!world.footprint_free(Cell::new(6, 0), Orientation::East, 1, u32::MAX, None));

        let far = tracked(i32::MAX - 1, 0, Orientation::North, u32::MAX, 1);
        assert!(far.covers(&Cell::new(i32::MAX, 0)));
        assert!(!far.covers(&Cell::new(0, 0)));

        let nan = RotatedRect::new(Point2::new(f64::NAN, 2.0), 1.0, 1.0, 0.0);
        assert!(!world.is_placement_valid(&nan, None));
        let nan_dims = RotatedRect::new(Point2::new(2.0, 2.0), f64::NAN, f64::NAN, 0.0);
        assert!(!world.is_placement_valid(&nan_dims, None));

        // An allowed area reaching past the grid coordinates still bounds placement
        world.set_allowed_area(Some(Area::new(2, 2, u32::MAX, u32::MAX)));
        let inside = RotatedRect::new(Point2::new(3.0, 3.0), 1.0, 1.0, 0.0);
        assert!(world.is_placement_valid(&inside, None));
        assert!(!world.is_free(&Cell::new(1, 1), None));
    }
}
