//! Sandbox parameters
//!
//! Loaded from `params/sandbox.toml`, with each section optional.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::{exit_mgr::ExitParams, motion::MotionParams, nav::NavParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SandboxParams {
    pub world: WorldParams,
    pub nav: NavParams,
    pub motion: MotionParams,
    pub exit: ExitParams,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorldParams {
    /// Initial grid width in cells.
    pub width: u32,

    /// Initial grid height in cells.
    pub height: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for WorldParams {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
