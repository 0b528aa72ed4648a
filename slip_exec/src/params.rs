//! # Executable Parameters
//!
//! Parameters for the `slip_exec` cycle, loaded from `params/exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ExecParams {
    /// Simulated duration of one cycle.
    pub cycle_period_s: f64,

    /// The executable stops once this much simulated time has passed.
    pub max_duration_s: f64,

    /// If true each cycle sleeps out the rest of its period so the simulation runs in wall-clock
    /// time.
    pub realtime: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ExecParams {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.05,
            max_duration_s: 300.0,
            realtime: false,
        }
    }
}
