//! # Telemetry module
//!
//! Telemetry is what the display layer reads back from the sandbox after each tick.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::tc::OrientationSpec;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Snapshot of a single agent's pose and status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgentTm {
    pub id: u32,

    /// Footprint origin in continuous cell units.
    pub x: f64,
    pub y: f64,

    /// Heading in degrees clockwise from north.
    pub heading_deg: f64,

    pub orientation: OrientationSpec,

    pub status: AgentStatusTm,
}

/// Telemetry for one engine tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TickTm {
    /// Simulated time at the end of the tick.
    pub sim_time_s: f64,

    pub agents: Vec<AgentTm>,

    pub events: Vec<EventTm>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatusTm {
    Waiting,
    Moving,
    Parked,
}

/// Events the sandbox reports alongside agent poses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventTm {
    /// An agent reached the end of a click-to-move drive.
    DriveFinished { agent: u32 },

    /// An agent began its exit manoeuvre.
    ExitStarted { agent: u32 },

    /// An agent arrived at its exit target.
    ExitParked { agent: u32 },

    /// The exit sequence halted while processing the given agent.
    ExitFailed {
        agent: u32,
        stage: String,
        reason: String,
    },

    /// Every queued agent is parked.
    ExitComplete,
}
