//! Exit sequence parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ExitParams {
    /// Number of straight steps each agent drives in its facing direction before planning.
    pub corridor_length: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ExitParams {
    fn default() -> Self {
        Self { corridor_length: 2 }
    }
}
