//! # Agents
//!
//! An agent is a SlipBot on the grid. Its continuous pose is written by the motion scheduler,
//! its status by the exit coordinator and sandbox.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Point2;
use sandbox_if::tm::{AgentStatusTm, AgentTm};
use serde::{Deserialize, Serialize};

use crate::{
    geom::{Cell, GridPose, Orientation, RotatedRect},
    world::TrackedAgent,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub type AgentId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,

    /// Footprint origin in continuous cell units.
    pub position: Point2<f64>,

    /// Heading in degrees clockwise from north.
    pub heading_deg: f64,

    pub orientation: Orientation,

    /// Nominal width in cells (the extent across the agent when facing north).
    pub width: u32,

    /// Nominal height in cells.
    pub height: u32,

    pub status: AgentStatus,
}

/// Archive row for an agent's pose at a point in simulated time.
#[derive(Debug, Clone, Serialize)]
pub struct AgentArchRow {
    pub sim_time_s: f64,
    pub id: AgentId,
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub orientation: Orientation,
    pub status: AgentStatus,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Waiting,
    Moving,
    Parked,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Agent {
    /// Create a new agent resting at the given pose.
    pub fn new(id: AgentId, pose: GridPose, width: u32, height: u32) -> Self {
        Self {
            id,
            position: pose.cell.to_point(),
            heading_deg: pose.orientation.heading_deg(),
            orientation: pose.orientation,
            width,
            height,
            status: AgentStatus::Waiting,
        }
    }

    /// The cell nearest to the agent's footprint origin.
    pub fn cell(&self) -> Cell {
        Cell::nearest(&self.position)
    }

    pub fn grid_pose(&self) -> GridPose {
        GridPose {
            cell: self.cell(),
            orientation: self.orientation,
        }
    }

    /// Snap the agent onto a grid pose, at rest.
    pub fn snap_to(&mut self, pose: GridPose) {
        self.position = pose.cell.to_point();
        self.orientation = pose.orientation;
        self.heading_deg = pose.orientation.heading_deg();
    }

    /// The continuous rectangle the agent currently occupies.
    pub fn rect(&self) -> RotatedRect {
        RotatedRect::from_footprint(
            self.position,
            self.orientation,
            self.width as f64,
            self.height as f64,
            self.heading_deg,
        )
    }

    /// The footprint the world should track for this agent.
    pub fn tracked(&self) -> TrackedAgent {
        TrackedAgent {
            origin: self.cell(),
            orientation: self.orientation,
            width: self.width,
            height: self.height,
            rect: self.rect(),
        }
    }

    pub fn to_tm(&self) -> AgentTm {
        AgentTm {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            heading_deg: self.heading_deg,
            orientation: self.orientation.into(),
            status: self.status.into(),
        }
    }

    pub fn arch_row(&self, sim_time_s: f64) -> AgentArchRow {
        AgentArchRow {
            sim_time_s,
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            heading_deg: self.heading_deg,
            orientation: self.orientation,
            status: self.status,
        }
    }
}

impl From<AgentStatus> for AgentStatusTm {
    fn from(s: AgentStatus) -> Self {
        match s {
            AgentStatus::Waiting => AgentStatusTm::Waiting,
            AgentStatus::Moving => AgentStatusTm::Moving,
            AgentStatus::Parked => AgentStatusTm::Parked,
        }
    }
}
