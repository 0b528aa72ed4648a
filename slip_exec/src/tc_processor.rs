//! # Telecommand processor module
//!
//! Applies telecommands from any source to the sandbox.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, info, warn};

// Internal
use sandbox_if::tc::Tc;
use slip_lib::{
    exit_mgr::ExitAssignment,
    geom::{Cell, GridPose, RotatedRect},
    nav::path_cost,
    sandbox::{Sandbox, SandboxError},
};

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Execute a telecommand.
///
/// A rejected telecommand is logged and otherwise ignored.
pub(crate) fn exec(sandbox: &mut Sandbox, tc: &Tc) {
    debug!("Executing TC {:?}", tc);

    if let Err(e) = try_exec(sandbox, tc) {
        warn!("Could not execute TC: {}", e);
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn try_exec(sandbox: &mut Sandbox, tc: &Tc) -> Result<(), SandboxError> {
    match tc {
        Tc::ConfigureWorld {
            width,
            height,
            allowed_area,
        } => {
            let blocked = sandbox.configure_world(*width, *height, allowed_area.map(Into::into))?;
            info!("World configured, {} cells blocked", blocked.len());
        }
        Tc::SetObstacles { cells } => {
            let cells: Vec<Cell> = cells.iter().copied().map(Cell::from).collect();
            let changed = sandbox.set_obstacles(&cells)?;
            debug!("Obstacles set, {} cells changed", changed.len());
        }
        Tc::AddObstacleRect { rect } => {
            let (id, changed) = sandbox.add_obstacle_rect(RotatedRect::from(*rect))?;
            info!("Obstacle rect {} added, {} cells changed", id, changed.len());
        }
        Tc::RemoveObstacleRect { id } => {
            let changed = sandbox.remove_obstacle_rect(*id)?;
            info!("Obstacle rect {} removed, {} cells changed", id, changed.len());
        }
        Tc::AddAgent {
            id,
            x,
            y,
            orientation,
            width,
            height,
        } => {
            sandbox.add_agent(
                *id,
                GridPose::new(*x, *y, (*orientation).into()),
                *width,
                *height,
            )?;
        }
        Tc::PlanPath { agent, goal } => {
            let path = sandbox.plan_path(*agent, Cell::from(*goal))?;
            info!("Planned path for agent {}: {} moves", agent, path_cost(&path));
        }
        Tc::Replan { edited } => {
            let edited: Vec<Cell> = edited.iter().copied().map(Cell::from).collect();
            let path = sandbox.replan(&edited)?;
            info!("Replanned path: {} moves", path_cost(&path));
        }
        Tc::DriveTo { agent, goal } => {
            let path = sandbox.drive_to(*agent, Cell::from(*goal))?;
            info!("Agent {} driving {} moves", agent, path_cost(&path));
        }
        Tc::PlanOrientedPath { agent, start, goal } => {
            let path =
                sandbox.plan_oriented_path(*agent, GridPose::from(*start), GridPose::from(*goal))?;
            info!(
                "Planned oriented path for agent {}: {} moves",
                agent,
                path_cost(&path)
            );
        }
        Tc::RunExitSequence { assignments } => {
            let assignments: Vec<ExitAssignment> =
                assignments.iter().copied().map(ExitAssignment::from).collect();
            sandbox.run_exit_sequence(assignments)?;
        }
        Tc::Gesture { gesture } => {
            sandbox.handle_gesture((*gesture).into())?;
        }
        Tc::Reset => sandbox.reset(),
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use slip_lib::{geom::Orientation, sandbox::SandboxParams};

    fn tc(json: &str) -> Tc {
        Tc::from_json(json).unwrap()
    }

    #[test]
    fn test_exec_script_commands() {
        let mut sb = Sandbox::new(SandboxParams::default()).unwrap();

        exec(
            &mut sb,
            &tc(r#"{"type": "add_agent", "id": 1, "x": 2, "y": 2, "orientation": "west", "width": 1, "height": 2}"#),
        );
        exec(
            &mut sb,
            &tc(r#"{"type": "set_obstacles", "cells": [{"x": 5, "y": 5}]}"#),
        );

        let agent = sb.agent(1).unwrap();
        assert_eq!(agent.orientation, Orientation::West);
        assert!(!sb.world().is_free(&Cell::new(5, 5), None));

        // Rejected commands leave the sandbox untouched
        exec(
            &mut sb,
            &tc(r#"{"type": "add_agent", "id": 2, "x": 5, "y": 5, "orientation": "north", "width": 1, "height": 1}"#),
        );
        assert!(sb.agent(2).is_none());

        exec(
            &mut sb,
            &tc(r#"{"type": "gesture", "gesture": {"kind": "click_target", "agent": 1, "x": 8, "y": 2}}"#),
        );
        assert!(!sb.is_idle());

        exec(&mut sb, &tc(r#"{"type": "reset"}"#));
        assert!(sb.agents().is_empty());
    }
}
