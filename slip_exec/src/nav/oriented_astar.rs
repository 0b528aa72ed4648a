//! Orientation-aware A*.
//!
//! Searches over (cell, orientation) states. From each state the planner may translate one cell
//! north, east, south or west while keeping its orientation, or turn a quarter clockwise in place.
//! Every move costs 1, so a turn is worth exactly one cell of travel.
//!
//! The heuristic is the Manhattan distance between footprint centres plus one if the orientation
//! differs from the goal's. For non-square footprints a turn moves the footprint centre by half a
//! cell, so the heuristic can overestimate by up to that amount and the returned path may be a
//! move longer than optimal in rare turn-heavy cases.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use ordered_float::OrderedFloat;

use super::{frontier::Frontier, NavError, NavParams, OrientedPath};
use crate::{
    geom::{GridPose, CARDINAL_STEPS},
    world::OccupancyView,
};

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Plan a path from `start` to `goal` in which every pose's footprint is free.
pub fn plan(
    view: &OccupancyView,
    start: GridPose,
    goal: GridPose,
    params: &NavParams,
) -> Result<OrientedPath, NavError> {
    if !view.is_pose_free(&start) {
        return Err(NavError::InvalidRequest(format!(
            "Start pose {} footprint is not free",
            start
        )));
    }
    if !view.is_pose_free(&goal) {
        return Err(NavError::InvalidRequest(format!(
            "Goal pose {} footprint is not free",
            goal
        )));
    }

    if start == goal {
        return Ok(Vec::new());
    }

    let cap = view.area() * 4 * params.oriented_iteration_factor;

    let mut frontier: Frontier<GridPose, OrderedFloat<f64>> = Frontier::new();
    let mut g: HashMap<GridPose, u32> = HashMap::new();
    let mut came_from: HashMap<GridPose, GridPose> = HashMap::new();
    let mut closed: HashSet<GridPose> = HashSet::new();

    g.insert(start, 0);
    frontier.push(start, OrderedFloat(heuristic(view, &start, &goal)));

    let mut iterations = 0;

    while let Some((current, _)) = frontier.pop() {
        if current == goal {
            let path = reconstruct(&came_from, start, goal);
            debug!(
                "Oriented A* planned {} -> {}: {} moves, {} expansions",
                start,
                goal,
                super::path_cost(&path),
                iterations
            );
            return Ok(path);
        }

        iterations += 1;
        if iterations > cap {
            warn!("Oriented A* hit its iteration cap of {}", cap);
            return Err(NavError::IterationCapExceeded(cap));
        }

        closed.insert(current);
        let g_current = g.get(&current).copied().unwrap_or(u32::MAX);

        for next in successors(view, &current) {
            if closed.contains(&next) {
                continue;
            }

            let tentative = g_current + 1;
            if g.get(&next).map(|old| tentative < *old).unwrap_or(true) {
                g.insert(next, tentative);
                came_from.insert(next, current);
                frontier.push(
                    next,
                    OrderedFloat(tentative as f64 + heuristic(view, &next, &goal)),
                );
            }
        }
    }

    Err(NavError::NoPathFound)
}

/// Free successor states of a pose: the four translations (north, east, south, west) then the
/// clockwise turn.
pub fn successors(view: &OccupancyView, pose: &GridPose) -> Vec<GridPose> {
    let mut out = Vec::with_capacity(5);

    for (dx, dy) in CARDINAL_STEPS.iter() {
        let next = GridPose {
            cell: pose.cell.offset(*dx, *dy),
            orientation: pose.orientation,
        };
        if view.in_bounds(&next.cell) && view.is_pose_free(&next) {
            out.push(next);
        }
    }

    let turned = GridPose {
        cell: pose.cell,
        orientation: pose.orientation.next(),
    };
    if view.is_pose_free(&turned) {
        out.push(turned);
    }

    out
}

fn heuristic(view: &OccupancyView, pose: &GridPose, goal: &GridPose) -> f64 {
    let (w, h) = view.footprint_size();
    let a = pose.footprint_centre(w, h);
    let b = goal.footprint_centre(w, h);

    let turn = if pose.orientation != goal.orientation {
        1.0
    } else {
        0.0
    };

    (a.x - b.x).abs() + (a.y - b.y).abs() + turn
}

fn reconstruct(
    came_from: &HashMap<GridPose, GridPose>,
    start: GridPose,
    goal: GridPose,
) -> OrientedPath {
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
