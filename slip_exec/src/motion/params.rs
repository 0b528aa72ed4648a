//! Motion scheduler parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use super::MotionError;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct MotionParams {
    /// Translation speed in cells per second.
    pub linear_speed_cells_s: f64,

    /// Rotation speed in degrees per second.
    pub angular_speed_deg_s: f64,

    /// Floor on the duration of any segment, so zero-length steps still take visible time.
    pub min_segment_duration_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotionParams {
    pub fn validate(&self) -> Result<(), MotionError> {
        if !(self.linear_speed_cells_s > 0.0) {
            return Err(MotionError::InvalidParams(format!(
                "linear_speed_cells_s must be positive, got {}",
                self.linear_speed_cells_s
            )));
        }
        if !(self.angular_speed_deg_s > 0.0) {
            return Err(MotionError::InvalidParams(format!(
                "angular_speed_deg_s must be positive, got {}",
                self.angular_speed_deg_s
            )));
        }
        if !(self.min_segment_duration_s > 0.0) {
            return Err(MotionError::InvalidParams(format!(
                "min_segment_duration_s must be positive, got {}",
                self.min_segment_duration_s
            )));
        }

        Ok(())
    }
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            linear_speed_cells_s: 4.0,
            angular_speed_deg_s: 180.0,
            min_segment_duration_s: 0.1,
        }
    }
}
