//! # SlipBot sandbox library.
//!
//! Grid world, planners, motion scheduling and exit sequencing for the SlipBot sandbox. The
//! `slip_exec` executable drives a [`sandbox::Sandbox`] from a telecommand script.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Agents - the SlipBots placed in the sandbox
pub mod agent;

/// Exit manager - moves a queue of agents out of the enclosure one at a time
pub mod exit_mgr;

/// Geometry - cells, poses, orientations and rotated rectangles
pub mod geom;

/// Motion scheduler - turns a path into timed motion
pub mod motion;

/// Navigation - D*-Lite and orientation-aware A* planners
pub mod nav;

/// Sandbox - the facade the input and display layers talk to
pub mod sandbox;

/// World - grid bounds, obstacles and agent occupancy
pub mod world;
