//! D*-Lite incremental planner.
//!
//! The search runs backwards from the goal, so after the agent moves or the world changes only
//! the part of the search tree affected by the change has to be repaired. Search nodes are
//! footprint origins held in a fixed orientation, and an origin is traversable when the whole
//! footprint is free.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeSet;

use log::{debug, trace, warn};
use ndarray::Array2;
use ordered_float::OrderedFloat;

use super::{frontier::Frontier, NavError, NavParams, GridPath};
use crate::{
    geom::{Cell, Orientation},
    world::OccupancyView,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const INF: f64 = f64::INFINITY;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Frontier key, compared lexicographically.
type Key = (OrderedFloat<f64>, OrderedFloat<f64>);

#[derive(Debug, Clone)]
pub struct DStarLite {
    params: NavParams,

    /// Grid dimensions the tables were built for.
    dims: (u32, u32),

    /// Orientation the footprint is held in for the whole search.
    orientation: Orientation,

    start: Cell,
    goal: Cell,

    /// Start at the time of the last key modifier update.
    last: Cell,

    /// Key modifier, accumulates the heuristic distance the start has moved.
    km: f64,

    g: Array2<f64>,
    rhs: Array2<f64>,

    frontier: Frontier<Cell, Key>,

    initialised: bool,

    /// Number of expansions in the most recent call to `compute_shortest_path`.
    last_expansions: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DStarLite {
    pub fn new(params: NavParams) -> Self {
        Self {
            params,
            dims: (0, 0),
            orientation: Orientation::North,
            start: Cell::new(0, 0),
            goal: Cell::new(0, 0),
            last: Cell::new(0, 0),
            km: 0.0,
            g: Array2::from_elem((0, 0), INF),
            rhs: Array2::from_elem((0, 0), INF),
            frontier: Frontier::new(),
            initialised: false,
            last_expansions: 0,
        }
    }

    /// Plan a fresh path from `start` to `goal` with the footprint held in `orientation`.
    pub fn plan(
        &mut self,
        view: &OccupancyView,
        start: Cell,
        goal: Cell,
        orientation: Orientation,
    ) -> Result<GridPath, NavError> {
        self.initialize(view, start, goal, orientation)?;
        self.compute_shortest_path(view)?;
        let path = self.extract_path(view)?;

        debug!(
            "D*-Lite planned {} -> {}: {} moves, {} expansions",
            start,
            goal,
            super::path_cost(&path),
            self.last_expansions
        );

        Ok(path)
    }

    /// Repair the search after the cells in `edited` changed occupancy and extract the new path.
    ///
    /// Call [`DStarLite::move_start`] first if the agent has moved since the last plan.
    pub fn replan(&mut self, view: &OccupancyView, edited: &[Cell]) -> Result<GridPath, NavError> {
        if !self.initialised {
            return Err(NavError::InvalidRequest(
                "Cannot replan before an initial plan".into(),
            ));
        }

        if view.grid_dims() != self.dims {
            return Err(NavError::InvalidRequest(format!(
                "World is {:?} but the planner was built for {:?}",
                view.grid_dims(),
                self.dims
            )));
        }

        if !view.is_origin_free(&self.start, self.orientation) {
            return Err(NavError::InvalidRequest(format!(
                "Start {} is no longer free",
                self.start
            )));
        }

        // An edited cell changes the traversability of every origin whose footprint covers it,
        // and through them the edge costs of their neighbours.
        let mut affected: BTreeSet<Cell> = BTreeSet::new();
        for cell in edited {
            for origin in view.origins_covering(cell, self.orientation) {
                affected.insert(origin);
                for (n, _) in view.neighbors(&origin) {
                    affected.insert(n);
                }
            }
        }

        trace!(
            "D*-Lite replan: {} edited cells, {} affected nodes",
            edited.len(),
            affected.len()
        );

        for node in affected {
            self.update_vertex(view, node);
        }

        self.compute_shortest_path(view)?;
        let path = self.extract_path(view)?;

        debug!(
            "D*-Lite replanned from {}: {} moves, {} expansions",
            self.start,
            super::path_cost(&path),
            self.last_expansions
        );

        Ok(path)
    }

    /// Reset the tables and seed the search from the goal.
    pub fn initialize(
        &mut self,
        view: &OccupancyView,
        start: Cell,
        goal: Cell,
        orientation: Orientation,
    ) -> Result<(), NavError> {
        if !view.in_bounds(&start) || !view.in_bounds(&goal) {
            return Err(NavError::InvalidRequest(format!(
                "Start {} or goal {} is outside the world",
                start, goal
            )));
        }
        if !view.is_origin_free(&start, orientation) {
            return Err(NavError::InvalidRequest(format!(
                "Start footprint at {} is not free",
                start
            )));
        }
        if !view.is_origin_free(&goal, orientation) {
            return Err(NavError::InvalidRequest(format!(
                "Goal footprint at {} is not free",
                goal
            )));
        }

        let (w, h) = view.grid_dims();
        self.dims = (w, h);
        self.orientation = orientation;
        self.start = start;
        self.goal = goal;
        self.last = start;
        self.km = 0.0;
        self.g = Array2::from_elem((w as usize, h as usize), INF);
        self.rhs = Array2::from_elem((w as usize, h as usize), INF);
        self.frontier.clear();

        self.set_rhs(&goal, 0.0);
        let key = self.calculate_key(&goal);
        self.frontier.push(goal, key);

        self.initialised = true;

        Ok(())
    }

    /// Expand nodes until the start is locally consistent and no queued key beats it.
    ///
    /// Returns the number of expansions performed.
    pub fn compute_shortest_path(&mut self, view: &OccupancyView) -> Result<usize, NavError> {
        let cap = view.area() * self.params.dstar_iteration_factor;
        let mut expansions = 0;

        while let Some((u, k_old)) = self.frontier.peek() {
            let start = self.start;
            if k_old >= self.calculate_key(&start) && self.rhs_of(&start) == self.g_of(&start) {
                break;
            }

            expansions += 1;
            if expansions > cap {
                warn!("D*-Lite hit its iteration cap of {}", cap);
                self.last_expansions = expansions;
                return Err(NavError::IterationCapExceeded(cap));
            }

            self.frontier.pop();
            let k_new = self.calculate_key(&u);

            if k_old < k_new {
                self.frontier.push(u, k_new);
            } else if self.g_of(&u) > self.rhs_of(&u) {
                self.set_g(&u, self.rhs_of(&u));
                for (n, _) in view.neighbors(&u) {
                    self.update_vertex(view, n);
                }
            } else {
                self.set_g(&u, INF);
                self.update_vertex(view, u);
                for (n, _) in view.neighbors(&u) {
                    self.update_vertex(view, n);
                }
            }
        }

        self.last_expansions = expansions;

        let start = self.start;
        if self.g_of(&start).is_infinite() {
            return Err(NavError::NoPathFound);
        }
        if self.rhs_of(&start) != self.g_of(&start) {
            return Err(NavError::InconsistentState(format!(
                "rhs({}) = {} but g = {}",
                start,
                self.rhs_of(&start),
                self.g_of(&start)
            )));
        }

        Ok(expansions)
    }

    /// Recompute a node's one-step lookahead and requeue it if it is inconsistent.
    pub fn update_vertex(&mut self, view: &OccupancyView, node: Cell) {
        if !view.in_bounds(&node) {
            return;
        }

        if node != self.goal {
            let rhs = if view.is_origin_free(&node, self.orientation) {
                view.neighbors(&node)
                    .iter()
                    .filter(|(n, _)| view.is_origin_free(n, self.orientation))
                    .map(|(n, c)| *c as f64 + self.g_of(n))
                    .fold(INF, f64::min)
            } else {
                INF
            };
            self.set_rhs(&node, rhs);
        }

        self.frontier.remove(&node);

        if self.g_of(&node) != self.rhs_of(&node) {
            let key = self.calculate_key(&node);
            self.frontier.push(node, key);
        }
    }

    /// Walk greedily from the start to the goal, always stepping to the free neighbour with the
    /// lowest `1 + g`. Ties go to the first neighbour in north, east, south, west order.
    pub fn extract_path(&self, view: &OccupancyView) -> Result<GridPath, NavError> {
        if self.start == self.goal {
            return Ok(Vec::new());
        }

        if self.g_of(&self.start).is_infinite() {
            return Err(NavError::NoPathFound);
        }

        let budget = view.area();
        let mut path = vec![self.start];
        let mut current = self.start;

        while current != self.goal {
            if path.len() > budget {
                return Err(NavError::InconsistentState(format!(
                    "Path extraction exceeded {} steps",
                    budget
                )));
            }

            let mut best: Option<(Cell, f64)> = None;
            for (n, c) in view.neighbors(&current) {
                if !view.is_origin_free(&n, self.orientation) {
                    continue;
                }

                let cost = c as f64 + self.g_of(&n);
                if best.map(|(_, b)| cost < b).unwrap_or(true) {
                    best = Some((n, cost));
                }
            }

            current = match best {
                Some((n, cost)) if cost.is_finite() => n,
                _ => {
                    return Err(NavError::InconsistentState(format!(
                        "No finite-cost successor from {}",
                        current
                    )))
                }
            };

            path.push(current);
        }

        Ok(path)
    }

    /// Move the search start to `cell`, updating the key modifier so queued keys stay valid
    /// lower bounds.
    pub fn move_start(&mut self, cell: Cell) {
        if cell == self.start {
            return;
        }

        self.km += self.last.manhattan(&cell) as f64;
        self.last = cell;
        self.start = cell;

        trace!("D*-Lite start moved to {}, km = {}", cell, self.km);
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn start(&self) -> Cell {
        self.start
    }

    pub fn goal(&self) -> Cell {
        self.goal
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn km(&self) -> f64 {
        self.km
    }

    pub fn last_expansions(&self) -> usize {
        self.last_expansions
    }

    /// Cost-to-goal estimate of a node, infinite if unknown or off the grid.
    pub fn g_of(&self, cell: &Cell) -> f64 {
        self.index(cell).map(|i| self.g[i]).unwrap_or(INF)
    }

    pub fn rhs_of(&self, cell: &Cell) -> f64 {
        self.index(cell).map(|i| self.rhs[i]).unwrap_or(INF)
    }

    fn set_g(&mut self, cell: &Cell, value: f64) {
        if let Some(i) = self.index(cell) {
            self.g[i] = value;
        }
    }

    fn set_rhs(&mut self, cell: &Cell, value: f64) {
        if let Some(i) = self.index(cell) {
            self.rhs[i] = value;
        }
    }

    fn index(&self, cell: &Cell) -> Option<[usize; 2]> {
        if cell.x < 0 || cell.y < 0 || cell.x >= self.dims.0 as i32 || cell.y >= self.dims.1 as i32 {
            None
        } else {
            Some([cell.x as usize, cell.y as usize])
        }
    }

    fn calculate_key(&self, cell: &Cell) -> Key {
        let m = self.g_of(cell).min(self.rhs_of(cell));
        (
            OrderedFloat(m + self.start.manhattan(cell) as f64 + self.km),
            OrderedFloat(m),
        )
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{nav::grid_astar, nav::path_cost, world::World};

    fn assert_valid(view: &OccupancyView, path: &[Cell], start: Cell, goal: Cell) {
        assert_eq!(path.first(), Some(&start));
        assert_eq!(path.last(), Some(&goal));
        for w in path.windows(2) {
            assert_eq!(w[0].manhattan(&w[1]), 1, "non-adjacent step {} -> {}", w[0], w[1]);
        }
        for c in path {
            assert!(view.is_origin_free(c, Orientation::North), "{} not free", c);
        }
    }

    #[test]
    fn test_open_grid_corner_to_corner() {
        let world = World::new(10, 10).unwrap();
        let view = world.view(None, 1, 1);
        let mut dsl = DStarLite::new(NavParams::default());

        let path = dsl
            .plan(&view, Cell::new(0, 0), Cell::new(9, 9), Orientation::North)
            .unwrap();

        assert_eq!(path.len(), 19);
        assert_eq!(path_cost(&path), 18);
        assert_valid(&view, &path, Cell::new(0, 0), Cell::new(9, 9));
    }

    #[test]
    fn test_already_at_goal() {
        let world = World::new(4, 4).unwrap();
        let view = world.view(None, 1, 1);
        let mut dsl = DStarLite::new(NavParams::default());

        let path = dsl
            .plan(&view, Cell::new(2, 2), Cell::new(2, 2), Orientation::North)
            .unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_matches_reference_astar() {
        let mut world = World::new(12, 9).unwrap();
        let walls: Vec<Cell> = (0..7)
            .map(|y| Cell::new(3, y))
            .chain((2..9).map(|y| Cell::new(7, y)))
            .chain(std::iter::once(Cell::new(4, 4)))
            .collect();
        world.set_obstacles(&walls).unwrap();

        for (w, h) in [(1, 1), (2, 1), (1, 2)].iter() {
            let view = world.view(None, *w, *h);
            let start = Cell::new(0, 0);
            let goal = Cell::new(10, 7);

            let mut dsl = DStarLite::new(NavParams::default());
            let path = dsl.plan(&view, start, goal, Orientation::North).unwrap();
            let reference =
                grid_astar::plan(&view, start, goal, Orientation::North, &NavParams::default())
                    .unwrap();

            assert_eq!(path_cost(&path), path_cost(&reference), "footprint {}x{}", w, h);
        }
    }

    #[test]
    fn test_single_obstacle_detour() {
        let mut world = World::new(10, 10).unwrap();
        let start = Cell::new(0, 5);
        let goal = Cell::new(2, 5);

        let mut dsl = DStarLite::new(NavParams::default());
        let before = dsl
            .plan(&world.view(None, 1, 1), start, goal, Orientation::North)
            .unwrap();
        assert_eq!(path_cost(&before), 2);

        let changed = world.set_obstacles(&[Cell::new(1, 5)]).unwrap();
        let view = world.view(None, 1, 1);
        let after = dsl.replan(&view, &changed).unwrap();

        assert_eq!(path_cost(&after), 4);
        assert_valid(&view, &after, start, goal);
    }

    #[test]
    fn test_replan_matches_fresh_plan() {
        let mut world = World::new(15, 15).unwrap();
        let start = Cell::new(1, 7);
        let goal = Cell::new(13, 7);

        let mut dsl = DStarLite::new(NavParams::default());
        dsl.plan(&world.view(None, 1, 1), start, goal, Orientation::North)
            .unwrap();

        // Drop a wall across the straight line with a gap at the bottom
        let wall: Vec<Cell> = (0..13).map(|y| Cell::new(7, y)).collect();
        let changed = world.set_obstacles(&wall).unwrap();
        let view = world.view(None, 1, 1);

        let replanned = dsl.replan(&view, &changed).unwrap();

        let mut fresh_planner = DStarLite::new(NavParams::default());
        let fresh = fresh_planner
            .plan(&view, start, goal, Orientation::North)
            .unwrap();

        assert_eq!(path_cost(&replanned), path_cost(&fresh));
        assert_valid(&view, &replanned, start, goal);
        assert_valid(&view, &fresh, start, goal);

        // Removing the wall again brings the straight line back
        let changed = world.set_obstacles(&[]).unwrap();
        let view = world.view(None, 1, 1);
        let replanned = dsl.replan(&view, &changed).unwrap();
        assert_eq!(path_cost(&replanned), 12);
    }

    #[test]
    fn test_replan_after_moving_start() {
        let mut world = World::new(10, 10).unwrap();
        let mut dsl = DStarLite::new(NavParams::default());

        let path = dsl
            .plan(&world.view(None, 1, 1), Cell::new(0, 0), Cell::new(9, 0), Orientation::North)
            .unwrap();
        assert_eq!(path_cost(&path), 9);

        // Agent advances three cells then an obstacle appears ahead of it
        dsl.move_start(path[3]);
        assert_eq!(dsl.km(), 3.0);

        let changed = world.set_obstacles(&[Cell::new(6, 0)]).unwrap();
        let view = world.view(None, 1, 1);
        let replanned = dsl.replan(&view, &changed).unwrap();

        let mut fresh = DStarLite::new(NavParams::default());
        let expected = fresh
            .plan(&view, path[3], Cell::new(9, 0), Orientation::North)
            .unwrap();

        assert_eq!(path_cost(&replanned), path_cost(&expected));
        assert_valid(&view, &replanned, path[3], Cell::new(9, 0));
    }

    #[test]
    fn test_no_path_fresh_and_replanned() {
        let mut world = World::new(8, 8).unwrap();
        let start = Cell::new(0, 0);
        let goal = Cell::new(6, 6);

        let mut dsl = DStarLite::new(NavParams::default());
        dsl.plan(&world.view(None, 1, 1), start, goal, Orientation::North)
            .unwrap();

        // Enclose the goal
        let ring = vec![
            Cell::new(5, 5),
            Cell::new(6, 5),
            Cell::new(7, 5),
            Cell::new(5, 6),
            Cell::new(5, 7),
        ];
        let changed = world.set_obstacles(&ring).unwrap();
        let view = world.view(None, 1, 1);

        assert_eq!(dsl.replan(&view, &changed), Err(NavError::NoPathFound));

        let mut fresh = DStarLite::new(NavParams::default());
        assert_eq!(
            fresh.plan(&view, start, goal, Orientation::North),
            Err(NavError::NoPathFound)
        );
    }

    #[test]
    fn test_invalid_requests() {
        let mut world = World::new(5, 5).unwrap();
        world.set_obstacles(&[Cell::new(4, 4)]).unwrap();
        let view = world.view(None, 1, 1);
        let mut dsl = DStarLite::new(NavParams::default());

        assert!(matches!(
            dsl.replan(&view, &[]),
            Err(NavError::InvalidRequest(_))
        ));
        assert!(matches!(
            dsl.plan(&view, Cell::new(0, 0), Cell::new(4, 4), Orientation::North),
            Err(NavError::InvalidRequest(_))
        ));
        assert!(matches!(
            dsl.plan(&view, Cell::new(0, 0), Cell::new(5, 0), Orientation::North),
            Err(NavError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_iteration_cap() {
        let world = World::new(20, 20).unwrap();
        let view = world.view(None, 1, 1);
        let params = NavParams {
            dstar_iteration_factor: 0,
            ..NavParams::default()
        };
        let mut dsl = DStarLite::new(params);

        assert_eq!(
            dsl.plan(&view, Cell::new(0, 0), Cell::new(19, 19), Orientation::North),
            Err(NavError::IterationCapExceeded(0))
        );
    }
}
