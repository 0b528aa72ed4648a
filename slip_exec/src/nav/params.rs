//! Navigation parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct NavParams {
    /// D*-Lite expansions allowed per grid cell before giving up.
    pub dstar_iteration_factor: usize,

    /// Oriented A* expansions allowed per (cell, orientation) state before giving up.
    pub oriented_iteration_factor: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for NavParams {
    fn default() -> Self {
        Self {
            dstar_iteration_factor: 8,
            oriented_iteration_factor: 8,
        }
    }
}
