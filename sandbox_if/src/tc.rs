//! # Telecommand module
//!
//! A telecommand is one operation requested of the sandbox, either forwarded from the input layer
//! or read from a script. Telecommands are JSON objects with a `"type"` field naming the
//! operation, for example:
//!
//! ```json
//! {"type": "add_obstacle_rect", "rect": {"cx": 4.5, "cy": 2.0, "width": 3.0, "height": 1.0}}
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use serde_json::{self, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Names of all recognised telecommand types, as found in the `"type"` field.
pub const TC_TYPES: [&str; 12] = [
    "configure_world",
    "set_obstacles",
    "add_obstacle_rect",
    "remove_obstacle_rect",
    "add_agent",
    "plan_path",
    "replan",
    "drive_to",
    "plan_oriented_path",
    "run_exit_sequence",
    "gesture",
    "reset",
];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An integer grid cell.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellSpec {
    pub x: i32,
    pub y: i32,
}

/// A cell plus a cardinal orientation.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoseSpec {
    pub x: i32,
    pub y: i32,
    pub orientation: OrientationSpec,
}

/// An axis-aligned cell rectangle, used for the allowed area.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AreaSpec {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A rotated rectangle in continuous cell units.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct RectSpec {
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,

    #[serde(default)]
    pub rotation_deg: f64,
}

/// One entry of an exit sequence.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExitAssignmentSpec {
    pub agent: u32,
    pub target: PoseSpec,

    /// Overrides the configured corridor length for this agent.
    #[serde(default)]
    pub corridor_length: Option<u32>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Cardinal orientation on the wire.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrientationSpec {
    North,
    East,
    South,
    West,
}

/// A pointer gesture forwarded by the input layer.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GestureSpec {
    /// Place a new agent with its footprint origin at the given cell.
    Place {
        agent: u32,
        x: i32,
        y: i32,
        orientation: OrientationSpec,
        width: u32,
        height: u32,
    },

    /// Pick up an existing agent.
    BeginDrag { agent: u32 },

    /// Move the agent being dragged so its origin is at the given cell.
    DragTo { x: i32, y: i32 },

    /// Drop the agent being dragged.
    EndDrag,

    /// Rotate an agent clockwise by a quarter turn in place.
    Rotate { agent: u32 },

    /// Drive an agent to the clicked cell.
    ClickTarget { agent: u32, x: i32, y: i32 },
}

/// A telecommand, i.e. an instruction sent to the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tc {
    ConfigureWorld {
        width: u32,
        height: u32,
        #[serde(default)]
        allowed_area: Option<AreaSpec>,
    },

    SetObstacles { cells: Vec<CellSpec> },

    AddObstacleRect { rect: RectSpec },

    RemoveObstacleRect { id: u32 },

    AddAgent {
        id: u32,
        x: i32,
        y: i32,
        orientation: OrientationSpec,
        width: u32,
        height: u32,
    },

    PlanPath { agent: u32, goal: CellSpec },

    Replan { edited: Vec<CellSpec> },

    DriveTo { agent: u32, goal: CellSpec },

    PlanOrientedPath {
        agent: u32,
        start: PoseSpec,
        goal: PoseSpec,
    },

    RunExitSequence { assignments: Vec<ExitAssignmentSpec> },

    Gesture { gesture: GestureSpec },

    Reset,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("TC has an invalid type ({0})")]
    InvalidType(String),

    #[error("TC of type {0} has an invalid payload: {1}")]
    InvalidPayload(String, serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {
    /// Parse a new TC from a JSON packet
    pub fn from_json(json_str: &str) -> Result<Self, TcParseError> {
        let val: Value = serde_json::from_str(json_str).map_err(TcParseError::InvalidJson)?;

        // Check the type first so that an unknown type isn't reported as a bad payload
        let tc_type = match val.get("type").and_then(|t| t.as_str()) {
            Some(s) => s.to_string(),
            None => {
                return Err(TcParseError::InvalidType(String::from(
                    "Expected \"type\" to be a string",
                )))
            }
        };

        if !TC_TYPES.contains(&tc_type.as_str()) {
            return Err(TcParseError::InvalidType(format!(
                "{} is not a recognised TC type",
                tc_type
            )));
        }

        serde_json::from_value(val).map_err(|e| TcParseError::InvalidPayload(tc_type, e))
    }

    /// Serialise the TC into its JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_tcs() {
        let tc = Tc::from_json(r#"{"type": "configure_world", "width": 10, "height": 8}"#).unwrap();
        assert_eq!(
            tc,
            Tc::ConfigureWorld {
                width: 10,
                height: 8,
                allowed_area: None
            }
        );

        let tc = Tc::from_json(
            r#"{"type": "gesture", "gesture": {"kind": "click_target", "agent": 2, "x": 3, "y": 4}}"#,
        )
        .unwrap();
        assert_eq!(
            tc,
            Tc::Gesture {
                gesture: GestureSpec::ClickTarget { agent: 2, x: 3, y: 4 }
            }
        );

        let tc = Tc::from_json(
            r#"{"type": "run_exit_sequence", "assignments": [
                {"agent": 1, "target": {"x": 1, "y": 1, "orientation": "north"}},
                {"agent": 2, "target": {"x": 4, "y": 1, "orientation": "east"}, "corridor_length": 3}
            ]}"#,
        )
        .unwrap();
        match tc {
            Tc::RunExitSequence { assignments } => {
                assert_eq!(assignments.len(), 2);
                assert_eq!(assignments[0].corridor_length, None);
                assert_eq!(assignments[1].corridor_length, Some(3));
                assert_eq!(assignments[1].target.orientation, OrientationSpec::East);
            }
            t => panic!("Wrong TC parsed: {:?}", t),
        }

        assert_eq!(Tc::from_json(r#"{"type": "reset"}"#).unwrap(), Tc::Reset);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Tc::from_json("{not json"),
            Err(TcParseError::InvalidJson(_))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"type": "teleport"}"#),
            Err(TcParseError::InvalidType(_))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"kind": "reset"}"#),
            Err(TcParseError::InvalidType(_))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"type": "drive_to", "agent": 1}"#),
            Err(TcParseError::InvalidPayload(_, _))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let tc = Tc::AddObstacleRect {
            rect: RectSpec {
                cx: 2.5,
                cy: 3.5,
                width: 2.0,
                height: 1.0,
                rotation_deg: 45.0,
            },
        };

        let json = tc.to_json().unwrap();
        assert_eq!(Tc::from_json(&json).unwrap(), tc);
    }
}
