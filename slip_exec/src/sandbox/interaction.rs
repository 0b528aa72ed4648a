//! User interaction modes.
//!
//! The sandbox is in exactly one interaction mode at a time. Gestures forwarded by the input layer
//! are only accepted in the modes where they make sense.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::fmt::Display;

use sandbox_if::tc::GestureSpec;

use crate::{
    agent::AgentId,
    geom::{Cell, GridPose},
};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Interaction {
    /// Nothing in progress.
    Idle,

    /// An agent is being dragged. `from` is where the drag started.
    Dragging { agent: AgentId, from: GridPose },

    /// An agent is driving to a clicked target.
    Driving { agent: AgentId },

    /// An exit sequence is running.
    Sequencing,
}

/// Pointer gestures understood by the sandbox.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Gesture {
    Place {
        agent: AgentId,
        pose: GridPose,
        width: u32,
        height: u32,
    },
    BeginDrag {
        agent: AgentId,
    },
    DragTo {
        cell: Cell,
    },
    EndDrag,
    Rotate {
        agent: AgentId,
    },
    ClickTarget {
        agent: AgentId,
        cell: Cell,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InteractionError {
    #[error("Gesture {gesture} is not accepted while {mode}")]
    Busy {
        mode: Interaction,
        gesture: &'static str,
    },

    #[error("Agent {agent} cannot be placed at {pose}")]
    PlacementRejected { agent: AgentId, pose: GridPose },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Interaction {
    /// Returns true if the gesture is accepted in this mode.
    pub fn accepts(&self, gesture: &Gesture) -> bool {
        match (self, gesture) {
            (Interaction::Idle, Gesture::Place { .. })
            | (Interaction::Idle, Gesture::BeginDrag { .. })
            | (Interaction::Idle, Gesture::Rotate { .. })
            | (Interaction::Idle, Gesture::ClickTarget { .. }) => true,

            (Interaction::Driving { .. }, Gesture::Place { .. })
            | (Interaction::Driving { .. }, Gesture::ClickTarget { .. }) => true,

            (Interaction::Dragging { .. }, Gesture::DragTo { .. })
            | (Interaction::Dragging { .. }, Gesture::EndDrag) => true,

            _ => false,
        }
    }

    /// Returns an error if the gesture isn't accepted in this mode.
    pub fn check(&self, gesture: &Gesture) -> Result<(), InteractionError> {
        if self.accepts(gesture) {
            Ok(())
        } else {
            Err(InteractionError::Busy {
                mode: *self,
                gesture: gesture.name(),
            })
        }
    }
}

impl Display for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interaction::Idle => write!(f, "idle"),
            Interaction::Dragging { agent, .. } => write!(f, "dragging agent {}", agent),
            Interaction::Driving { agent } => write!(f, "driving agent {}", agent),
            Interaction::Sequencing => write!(f, "sequencing"),
        }
    }
}

impl Gesture {
    pub fn name(&self) -> &'static str {
        match self {
            Gesture::Place { .. } => "place",
            Gesture::BeginDrag { .. } => "begin_drag",
            Gesture::DragTo { .. } => "drag_to",
            Gesture::EndDrag => "end_drag",
            Gesture::Rotate { .. } => "rotate",
            Gesture::ClickTarget { .. } => "click_target",
        }
    }
}

impl From<GestureSpec> for Gesture {
    fn from(g: GestureSpec) -> Self {
        match g {
            GestureSpec::Place {
                agent,
                x,
                y,
                orientation,
                width,
                height,
            } => Gesture::Place {
                agent,
                pose: GridPose::new(x, y, orientation.into()),
                width,
                height,
            },
            GestureSpec::BeginDrag { agent } => Gesture::BeginDrag { agent },
            GestureSpec::DragTo { x, y } => Gesture::DragTo {
                cell: Cell::new(x, y),
            },
            GestureSpec::EndDrag => Gesture::EndDrag,
            GestureSpec::Rotate { agent } => Gesture::Rotate { agent },
            GestureSpec::ClickTarget { agent, x, y } => Gesture::ClickTarget {
                agent,
                cell: Cell::new(x, y),
            },
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::Orientation;

    #[test]
    fn test_modes_are_exclusive() {
        let drag = Gesture::DragTo {
            cell: Cell::new(1, 1),
        };
        let click = Gesture::ClickTarget {
            agent: 1,
            cell: Cell::new(1, 1),
        };

        assert!(!Interaction::Idle.accepts(&drag));
        assert!(Interaction::Idle.accepts(&click));

        let dragging = Interaction::Dragging {
            agent: 1,
            from: GridPose::new(0, 0, Orientation::North),
        };
        assert!(dragging.accepts(&drag));
        assert!(!dragging.accepts(&click));

        // Retargeting while driving is fine, anything during a sequence is not
        assert!(Interaction::Driving { agent: 1 }.accepts(&click));
        assert!(matches!(
            Interaction::Sequencing.check(&click),
            Err(InteractionError::Busy {
                gesture: "click_target",
                ..
            })
        ));
    }
}
