//! Reference 4-connected A* over footprint origins.
//!
//! Holds the footprint in a fixed orientation like [`DStarLite`](super::DStarLite) does, and is
//! used to check its optimality and as a benchmark baseline.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::{HashMap, HashSet};

use log::trace;

use super::{frontier::Frontier, GridPath, NavError, NavParams};
use crate::{
    geom::{Cell, Orientation},
    world::OccupancyView,
};

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Plan a minimum-length path from `start` to `goal`.
pub fn plan(
    view: &OccupancyView,
    start: Cell,
    goal: Cell,
    orientation: Orientation,
    params: &NavParams,
) -> Result<GridPath, NavError> {
    if !view.is_origin_free(&start, orientation) || !view.is_origin_free(&goal, orientation) {
        return Err(NavError::InvalidRequest(format!(
            "Start {} or goal {} footprint is not free",
            start, goal
        )));
    }

    if start == goal {
        return Ok(Vec::new());
    }

    let cap = view.area() * params.dstar_iteration_factor;

    let mut frontier: Frontier<Cell, u32> = Frontier::new();
    let mut g: HashMap<Cell, u32> = HashMap::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut closed: HashSet<Cell> = HashSet::new();

    g.insert(start, 0);
    frontier.push(start, start.manhattan(&goal));

    let mut iterations = 0;

    while let Some((current, _)) = frontier.pop() {
        if current == goal {
            trace!("Reference A* reached the goal after {} iterations", iterations);
            return Ok(reconstruct(&came_from, start, goal));
        }

        iterations += 1;
        if iterations > cap {
            return Err(NavError::IterationCapExceeded(cap));
        }

        closed.insert(current);
        let g_current = g.get(&current).copied().unwrap_or(u32::MAX);

        for (n, c) in view.neighbors(&current) {
            if closed.contains(&n) || !view.is_origin_free(&n, orientation) {
                continue;
            }

            let tentative = g_current + c;
            if g.get(&n).map(|old| tentative < *old).unwrap_or(true) {
                g.insert(n, tentative);
                came_from.insert(n, current);
                frontier.push(n, tentative + n.manhattan(&goal));
            }
        }
    }

    Err(NavError::NoPathFound)
}

fn reconstruct(came_from: &HashMap<Cell, Cell>, start: Cell, goal: Cell) -> GridPath {
    let mut path = vec![goal];
    let mut current = goal;

    while current != start {
        match came_from.get(&current) {
            Some(p) => {
                current = *p;
                path.push(current);
            }
            None => break,
        }
    }

    path.reverse();
    path
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{nav::path_cost, world::World};

    #[test]
    fn test_reference_astar() {
        let mut world = World::new(6, 6).unwrap();
        world
            .set_obstacles(&[Cell::new(2, 0), Cell::new(2, 1), Cell::new(2, 2), Cell::new(2, 3)])
            .unwrap();
        let view = world.view(None, 1, 1);
        let params = NavParams::default();

        let path = plan(&view, Cell::new(0, 0), Cell::new(4, 0), Orientation::North, &params).unwrap();
        assert_eq!(path_cost(&path), 12);
        assert_eq!(path.first(), Some(&Cell::new(0, 0)));
        assert_eq!(path.last(), Some(&Cell::new(4, 0)));

        world
            .set_obstacles(&(0..6).map(|y| Cell::new(2, y)).collect::<Vec<_>>())
            .unwrap();
        let view = world.view(None, 1, 1);
        assert_eq!(
            plan(&view, Cell::new(0, 0), Cell::new(4, 0), Orientation::North, &params),
            Err(NavError::NoPathFound)
        );
    }
}
